use serde::Serialize;

use crate::profiles::EncodingProfile;

const AUDIO_CHANNELS: &str = "2";
const AUDIO_SAMPLE_RATE: &str = "48000";
const AUDIO_RESAMPLE_FILTER: &str = "aresample=async=1000:first_pts=0";
const PIXEL_FORMAT: &str = "yuv420p";
const INPUT_TRANSPORT: &str = "tcp";
const OUTPUT_FORMAT: &str = "rtsp";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Value passed to the transcoder's `-loglevel`.
    pub log_level: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Builds the transcoder argument vector with default options.
pub fn compile(input_url: &str, profiles: &[&EncodingProfile], base_output_url: &str) -> Vec<String> {
    compile_with(&CompileOptions::default(), input_url, profiles, base_output_url)
}

pub fn compile_with(
    options: &CompileOptions,
    input_url: &str,
    profiles: &[&EncodingProfile],
    base_output_url: &str,
) -> Vec<String> {
    let mut args = vec![
        arg("-rtsp_transport"),
        arg(INPUT_TRANSPORT),
        arg("-i"),
        arg(input_url),
        arg("-threads"),
        arg("0"),
        arg("-nostdin"),
        arg("-loglevel"),
        arg(&options.log_level),
    ];

    for profile in profiles {
        push_profile(&mut args, profile, base_output_url);
    }

    args
}

// Every option below binds to the output that follows it, so the order is fixed.
fn push_profile(args: &mut Vec<String>, profile: &EncodingProfile, base_output_url: &str) {
    args.extend([arg("-map"), arg("0:v:0"), arg("-map"), arg("0:a:0?")]);

    if let Some(extra) = profile.extra_opts_for_codec() {
        args.extend(extra.args.iter().cloned());
    }

    args.extend([arg("-c:v"), arg(&profile.video_codec)]);

    if let Some(preset) = &profile.preset {
        args.extend([arg("-preset"), arg(preset)]);
    }

    let gop = profile.gop_size.to_string();
    args.extend([
        arg("-b:v"),
        profile.video_bitrate.to_string(),
        arg("-maxrate"),
        profile.max_rate().to_string(),
        arg("-bufsize"),
        profile.buffer_size().to_string(),
        arg("-s"),
        profile.resolution.to_string(),
        arg("-g"),
        gop.clone(),
        arg("-keyint_min"),
        gop,
        arg("-sc_threshold"),
        arg("0"),
        arg("-pix_fmt"),
        arg(PIXEL_FORMAT),
    ]);

    if let Some(fps) = profile.output_fps {
        args.extend([arg("-r"), fps.to_string()]);
    }

    args.extend([
        arg("-c:a"),
        arg(&profile.audio_codec),
        arg("-b:a"),
        profile.audio_bitrate.to_string(),
        arg("-ac"),
        arg(AUDIO_CHANNELS),
        arg("-ar"),
        arg(AUDIO_SAMPLE_RATE),
        arg("-af"),
        arg(AUDIO_RESAMPLE_FILTER),
    ]);

    args.extend([
        arg("-f"),
        arg(OUTPUT_FORMAT),
        destination(base_output_url, profile),
    ]);
}

pub fn destination(base_output_url: &str, profile: &EncodingProfile) -> String {
    format!("{base_output_url}/{}", profile.name)
}

fn arg(value: &str) -> String {
    value.to_owned()
}

/// One supervised run's worth of work: where to read, where to push, and what to encode.
#[derive(Clone, Debug, Serialize)]
pub struct TranscodeJob<'a> {
    pub input_url: String,
    pub output_base_url: String,
    pub profiles: Vec<&'a EncodingProfile>,
    #[serde(skip)]
    pub options: CompileOptions,
}

impl<'a> TranscodeJob<'a> {
    pub fn new(
        input_url: impl Into<String>,
        output_base_url: impl Into<String>,
        profiles: Vec<&'a EncodingProfile>,
    ) -> Self {
        Self {
            input_url: input_url.into(),
            output_base_url: output_base_url.into(),
            profiles,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn args(&self) -> Vec<String> {
        compile_with(
            &self.options,
            &self.input_url,
            &self.profiles,
            &self.output_base_url,
        )
    }

    pub fn destinations(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|profile| destination(&self.output_base_url, profile))
            .collect()
    }

    /// Logs the per-output summary shown before the transcoder starts.
    pub fn log_summary(&self) {
        tracing::info!(input = %self.input_url, output_base = %self.output_base_url, "transcode job");
        for profile in &self.profiles {
            tracing::info!(
                profile = %profile.name,
                destination = %destination(&self.output_base_url, profile),
                resolution = %profile.resolution,
                video_bitrate = %profile.video_bitrate,
                audio_bitrate = %profile.audio_bitrate,
                fps = ?profile.output_fps,
                "output stream"
            );
            if let Some(extra) = profile.extra_opts_for_codec() {
                tracing::info!(
                    profile = %profile.name,
                    encoder = %extra.encoder,
                    options = %extra.args.join(" "),
                    "encoder tuning"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileRegistry;

    const INPUT: &str = "rtsp://camera.local:8080/h264.sdp";
    const OUTPUT: &str = "rtsp://localhost:8554/live";

    fn value_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.windows(2)
            .filter(|pair| pair[0] == flag)
            .map(|pair| pair[1].as_str())
            .collect()
    }

    #[test]
    fn global_arguments_lead_the_vector() {
        let registry = ProfileRegistry::builtin();
        let args = compile(INPUT, &[registry.lookup("low").unwrap()], OUTPUT);
        assert_eq!(
            &args[..9],
            &[
                "-rtsp_transport",
                "tcp",
                "-i",
                INPUT,
                "-threads",
                "0",
                "-nostdin",
                "-loglevel",
                "info"
            ]
        );
    }

    #[test]
    fn single_profile_block_matches_expected_layout() {
        let registry = ProfileRegistry::builtin();
        let args = compile(INPUT, &[registry.lookup("high").unwrap()], OUTPUT);
        let expected = [
            "-map",
            "0:v:0",
            "-map",
            "0:a:0?",
            "-tune",
            "zerolatency",
            "-x265-params",
            "aq-mode=2:aq-strength=0.8:psy-rd=1.5:rdoq=1",
            "-c:v",
            "libx265",
            "-preset",
            "superfast",
            "-b:v",
            "512k",
            "-maxrate",
            "665k",
            "-bufsize",
            "1330k",
            "-s",
            "1280x720",
            "-g",
            "40",
            "-keyint_min",
            "40",
            "-sc_threshold",
            "0",
            "-pix_fmt",
            "yuv420p",
            "-r",
            "20",
            "-c:a",
            "aac",
            "-b:a",
            "48k",
            "-ac",
            "2",
            "-ar",
            "48000",
            "-af",
            "aresample=async=1000:first_pts=0",
            "-f",
            "rtsp",
            "rtsp://localhost:8554/live/high",
        ];
        assert_eq!(&args[9..], &expected);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let mut profile = ProfileRegistry::builtin().lookup("low").cloned().unwrap();
        profile.preset = None;
        profile.output_fps = None;
        profile.video_codec = "libx264".into();

        let args = compile(INPUT, &[&profile], OUTPUT);
        assert!(value_after(&args, "-preset").is_empty());
        assert!(value_after(&args, "-r").is_empty());
        assert!(value_after(&args, "-x265-params").is_empty());
        assert_eq!(value_after(&args, "-c:v"), vec!["libx264"]);
    }

    #[test]
    fn sinks_follow_selection_order() {
        let registry = ProfileRegistry::builtin();
        let selection = [
            registry.lookup("quality").unwrap(),
            registry.lookup("high").unwrap(),
            registry.lookup("quality").unwrap(),
        ];
        let args = compile(INPUT, &selection, OUTPUT);
        assert_eq!(
            value_after(&args, "rtsp"),
            vec![
                "rtsp://localhost:8554/live/quality",
                "rtsp://localhost:8554/live/high",
                "rtsp://localhost:8554/live/quality",
            ]
        );
        assert_eq!(value_after(&args, "-maxrate"), vec!["640k", "665k", "640k"]);
    }

    #[test]
    fn job_uses_configured_log_level() {
        let registry = ProfileRegistry::builtin();
        let job = TranscodeJob::new(INPUT, OUTPUT, vec![registry.lookup("low").unwrap()])
            .with_options(CompileOptions {
                log_level: "warning".into(),
            });
        assert_eq!(value_after(&job.args(), "-loglevel"), vec!["warning"]);
        assert_eq!(job.destinations(), vec!["rtsp://localhost:8554/live/low"]);
    }
}
