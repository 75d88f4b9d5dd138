use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "transcode-relay")]
#[command(author, version, about = "Re-encode one live source into several RTSP push streams")]
pub struct Cli {
    /// Profiles to run, in output order (defaults to the configured selection)
    #[arg(short, long = "profile", value_name = "NAME", num_args = 1..)]
    pub profiles: Vec<String>,

    /// Input source URL
    #[arg(short, long, value_name = "URL")]
    pub input: Option<String>,

    /// Base URL each profile's stream is pushed under
    #[arg(short, long, value_name = "URL")]
    pub output: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Transcoder binary to launch
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the transcoder command without starting it
    #[arg(long)]
    pub dry_run: bool,

    /// Print the available profiles and exit
    #[arg(long)]
    pub list_profiles: bool,

    /// Print --dry-run and --list-profiles output as JSON
    #[arg(long)]
    pub json: bool,
}
