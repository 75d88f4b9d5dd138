mod cli;

use std::{
    env,
    fs::OpenOptions,
    path::Path,
    process::ExitCode,
    sync::Mutex,
};

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use transcode_relay::{
    RelayConfig, Supervisor, TranscodeError, TranscodeJob, profiles::ProfileRegistry,
    selection,
};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = setup_tracing(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("failed to open log file: {err}");
        return ExitCode::from(err.exit_code());
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "transcode relay aborted");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, TranscodeError> {
    let mut config = RelayConfig::load(cli.config.as_deref())?;
    if let Some(input) = cli.input {
        config.input_url = input;
    }
    if let Some(output) = cli.output {
        config.output_base_url = output;
    }
    if let Some(program) = cli.ffmpeg {
        config.supervisor.program = program;
    }
    config.validate()?;

    if cli.list_profiles {
        print_profiles(&config.registry, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    let requested = if cli.profiles.is_empty() {
        config.default_profiles.clone()
    } else {
        cli.profiles
    };

    let profiles = selection::resolve(&config.registry, &requested)?;

    let job = TranscodeJob::new(&config.input_url, &config.output_base_url, profiles)
        .with_options(config.compile_options());
    let args = job.args();

    if cli.dry_run {
        print_command(&config, &job, &args, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    job.log_summary();
    tracing::info!(
        command = %format!("{} {}", config.supervisor.program.display(), args.join(" ")),
        "starting transcoder"
    );

    let (interrupt_tx, mut interrupts) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let mut supervisor = Supervisor::new(config.supervisor.clone());
    let outcome = supervisor.run(&args, &mut interrupts).await?;

    tracing::info!(
        run_id = %outcome.run_id,
        exit_code = ?outcome.exit_code,
        reason = ?outcome.reason,
        forced_kill = outcome.forced_kill,
        "transcoder stopped"
    );

    Ok(match outcome.exit_code {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)),
        None => ExitCode::FAILURE,
    })
}

fn print_profiles(registry: &ProfileRegistry, json: bool) -> Result<(), TranscodeError> {
    if json {
        let profiles: Vec<_> = registry.iter().collect();
        println!("{}", to_json(&profiles)?);
        return Ok(());
    }

    for profile in registry.iter() {
        println!(
            "{:<10} {:>9}  video {:>6} (max {:>6})  audio {:>4}  gop {:>4}  fps {:>4}  {}",
            profile.name,
            profile.resolution.to_string(),
            profile.video_bitrate.to_string(),
            profile.max_rate().to_string(),
            profile.audio_bitrate.to_string(),
            profile.gop_size,
            profile
                .output_fps
                .map(|fps| fps.to_string())
                .unwrap_or_else(|| "-".into()),
            profile.video_codec,
        );
    }
    Ok(())
}

fn print_command(
    config: &RelayConfig,
    job: &TranscodeJob<'_>,
    args: &[String],
    json: bool,
) -> Result<(), TranscodeError> {
    if json {
        let value = serde_json::json!({
            "program": config.supervisor.program,
            "args": args,
            "destinations": job.destinations(),
        });
        println!("{}", to_json(&value)?);
    } else {
        println!("{} {}", config.supervisor.program.display(), args.join(" "));
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, TranscodeError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| TranscodeError::Io(std::io::Error::other(err)))
}

fn setup_tracing(verbose: bool, log_file: Option<&Path>) -> Result<(), TranscodeError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let default_filter = if verbose {
        "transcode_relay=debug"
    } else {
        "transcode_relay=info"
    };
    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_level(true)
        .compact();

    let file = match log_file {
        Some(path) => {
            let handle = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(handle))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    let init_result = tracing_subscriber::registry()
        .with(EnvFilter::new(&env_filter))
        .with(console)
        .with(file)
        .try_init();

    if init_result.is_ok() {
        tracing::debug!(current_filter = %env_filter, "tracing initialized");
    }

    Ok(())
}
