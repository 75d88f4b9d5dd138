use std::{
    env,
    io::Write,
    sync::{Mutex, OnceLock},
    time::Duration,
};

use tempfile::NamedTempFile;
use transcode_relay::{
    config::{
        DEFAULT_OUTPUT_BASE_URL, ENV_DRAIN_JOIN_TIMEOUT_MS, ENV_ERROR_KEYWORDS, ENV_FFMPEG_BIN,
        ENV_FFMPEG_LOGLEVEL, ENV_GRACEFUL_TIMEOUT_SECS, ENV_INPUT_URL, ENV_OUTPUT_BASE_URL,
        ENV_PROFILES, ENV_PROGRESS_MARKERS, RelayConfig,
    },
    error::TranscodeError,
    supervisor::{DRAIN_JOIN_TIMEOUT, GRACEFUL_TIMEOUT},
};

static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

const ENV_KEYS: [&str; 9] = [
    ENV_INPUT_URL,
    ENV_OUTPUT_BASE_URL,
    ENV_FFMPEG_BIN,
    ENV_FFMPEG_LOGLEVEL,
    ENV_PROGRESS_MARKERS,
    ENV_PROFILES,
    ENV_GRACEFUL_TIMEOUT_SECS,
    ENV_DRAIN_JOIN_TIMEOUT_MS,
    ENV_ERROR_KEYWORDS,
];

fn with_env<F: FnOnce()>(vars: &[(&str, &str)], body: F) {
    let lock = ENV_MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let previous: Vec<(&str, Option<String>)> =
        ENV_KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in ENV_KEYS {
        unsafe { env::remove_var(key) };
    }
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    body();

    for (key, value) in previous {
        match value {
            Some(value) => unsafe { env::set_var(key, value) },
            None => unsafe { env::remove_var(key) },
        }
    }

    drop(lock);
}

#[test]
fn defaults_match_the_reference_deployment() {
    with_env(&[], || {
        let config = RelayConfig::load(None).unwrap();
        assert_eq!(config.output_base_url, DEFAULT_OUTPUT_BASE_URL);
        assert_eq!(config.default_profiles, vec!["high", "low"]);
        assert_eq!(config.ffmpeg_log_level, "info");
        assert_eq!(config.supervisor.graceful_timeout, GRACEFUL_TIMEOUT);
        assert_eq!(config.supervisor.drain_join_timeout, DRAIN_JOIN_TIMEOUT);
        assert_eq!(config.registry.names(), vec!["high", "low", "quality"]);
    });
}

#[test]
fn env_overrides_defaults() {
    with_env(
        &[
            (ENV_INPUT_URL, "rtsp://10.0.0.5:554/stream"),
            (ENV_OUTPUT_BASE_URL, "rtsp://media:8554/cams/"),
            (ENV_FFMPEG_BIN, "/usr/local/bin/ffmpeg"),
            (ENV_PROFILES, "quality, low"),
            (ENV_GRACEFUL_TIMEOUT_SECS, "3"),
            (ENV_DRAIN_JOIN_TIMEOUT_MS, "not-a-number"),
            (ENV_ERROR_KEYWORDS, "error,dropping"),
        ],
        || {
            let config = RelayConfig::load(None).unwrap();
            assert_eq!(config.input_url, "rtsp://10.0.0.5:554/stream");
            assert_eq!(config.output_base_url, "rtsp://media:8554/cams");
            assert_eq!(
                config.supervisor.program.to_str(),
                Some("/usr/local/bin/ffmpeg")
            );
            assert_eq!(config.default_profiles, vec!["quality", "low"]);
            assert_eq!(config.supervisor.graceful_timeout, Duration::from_secs(3));
            assert_eq!(config.supervisor.drain_join_timeout, DRAIN_JOIN_TIMEOUT);
            assert_eq!(
                config.supervisor.classifier.error_keywords,
                vec!["error", "dropping"]
            );
        },
    );
}

#[test]
fn file_replaces_profiles_and_settings() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
input_url = "rtsp://camera.lan/h264"
default_profiles = ["mobile"]
graceful_timeout_secs = 5
drain_join_timeout_ms = 250

[classifier]
progress_markers = ["out_time="]

[[profiles]]
name = "mobile"
resolution = "640x360"
video_bitrate = "300k"
audio_bitrate = "32k"
max_rate_multiplier = 1.5
gop_size = 50
video_codec = "hevc_nvenc"
audio_codec = "aac"

[[profiles.codec_extra_opts]]
encoder = "hevc_nvenc"
args = ["-rc", "cbr"]
"#
    )
    .unwrap();

    with_env(&[], || {
        let config = RelayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.input_url, "rtsp://camera.lan/h264");
        assert_eq!(config.default_profiles, vec!["mobile"]);
        assert_eq!(config.supervisor.graceful_timeout, Duration::from_secs(5));
        assert_eq!(
            config.supervisor.drain_join_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(
            config.supervisor.classifier.progress_markers,
            vec!["out_time="]
        );
        assert_eq!(config.supervisor.classifier.error_keywords.len(), 4);

        let mobile = config.registry.lookup("mobile").unwrap();
        assert_eq!(mobile.max_rate().as_kbps(), 450);
        assert!(mobile.preset.is_none());
        assert_eq!(mobile.extra_opts_for_codec().unwrap().args, vec!["-rc", "cbr"]);
        assert!(config.registry.lookup("high").is_none());
    });
}

#[test]
fn file_with_invalid_profile_is_rejected() {
    let result = RelayConfig::from_toml_str(
        r#"
[[profiles]]
name = "broken"
resolution = "640x360"
video_bitrate = "300k"
audio_bitrate = "32k"
max_rate_multiplier = 0.8
gop_size = 50
video_codec = "libx265"
audio_codec = "aac"
"#,
    );
    assert!(matches!(result, Err(TranscodeError::Config(_))));
}

#[test]
fn unknown_keys_are_rejected() {
    let result = RelayConfig::from_toml_str("input = \"rtsp://x\"\n");
    assert!(matches!(result, Err(TranscodeError::Config(_))));
}

#[test]
fn invalid_urls_fail_validation() {
    let mut config = RelayConfig {
        input_url: "not a url".into(),
        ..RelayConfig::default()
    };
    assert!(config.validate().is_err());

    let mut config = RelayConfig {
        output_base_url: "/live/streams".into(),
        ..RelayConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn missing_file_is_a_config_error() {
    with_env(&[], || {
        let result = RelayConfig::load(Some(std::path::Path::new(
            "/nonexistent/transcode-relay.toml",
        )));
        assert!(matches!(result, Err(TranscodeError::Config(_))));
    });
}
