use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use url::Url;

use crate::{
    command::{CompileOptions, DEFAULT_LOG_LEVEL},
    error::TranscodeError,
    profiles::{EncodingProfile, ProfileRegistry},
    supervisor::{ClassifierConfig, SupervisorConfig},
};

pub const DEFAULT_INPUT_URL: &str = "rtsp://192.168.201.72:8080/h264.sdp";
pub const DEFAULT_OUTPUT_BASE_URL: &str = "rtsp://localhost:8554/live";
pub const DEFAULT_PROFILES: [&str; 2] = ["high", "low"];

pub const ENV_INPUT_URL: &str = "RELAY_INPUT_URL";
pub const ENV_OUTPUT_BASE_URL: &str = "RELAY_OUTPUT_BASE_URL";
pub const ENV_FFMPEG_BIN: &str = "RELAY_FFMPEG_BIN";
pub const ENV_FFMPEG_LOGLEVEL: &str = "RELAY_FFMPEG_LOGLEVEL";
pub const ENV_PROFILES: &str = "RELAY_PROFILES";
pub const ENV_GRACEFUL_TIMEOUT_SECS: &str = "RELAY_GRACEFUL_TIMEOUT_SECS";
pub const ENV_DRAIN_JOIN_TIMEOUT_MS: &str = "RELAY_DRAIN_JOIN_TIMEOUT_MS";
pub const ENV_PROGRESS_MARKERS: &str = "RELAY_PROGRESS_MARKERS";
pub const ENV_ERROR_KEYWORDS: &str = "RELAY_ERROR_KEYWORDS";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub input_url: String,
    pub output_base_url: String,
    pub default_profiles: Vec<String>,
    pub ffmpeg_log_level: String,
    pub supervisor: SupervisorConfig,
    pub registry: ProfileRegistry,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            input_url: DEFAULT_INPUT_URL.to_string(),
            output_base_url: DEFAULT_OUTPUT_BASE_URL.to_string(),
            default_profiles: DEFAULT_PROFILES.iter().map(|name| name.to_string()).collect(),
            ffmpeg_log_level: DEFAULT_LOG_LEVEL.to_string(),
            supervisor: SupervisorConfig::default(),
            registry: ProfileRegistry::builtin(),
        }
    }
}

/// Shape of the optional TOML configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    input_url: Option<String>,
    output_base_url: Option<String>,
    ffmpeg_bin: Option<PathBuf>,
    ffmpeg_log_level: Option<String>,
    default_profiles: Option<Vec<String>>,
    graceful_timeout_secs: Option<u64>,
    drain_join_timeout_ms: Option<u64>,
    classifier: Option<ClassifierConfig>,
    profiles: Option<Vec<EncodingProfile>>,
}

impl RelayConfig {
    /// Defaults, then the file at `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, TranscodeError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    TranscodeError::config(format!("cannot read {}: {err}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, TranscodeError> {
        let file: FileConfig = toml::from_str(raw).map_err(TranscodeError::config)?;
        let mut config = Self::default();
        config.apply_file(file)?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), TranscodeError> {
        if let Some(value) = file.input_url {
            self.input_url = value;
        }
        if let Some(value) = file.output_base_url {
            self.output_base_url = value;
        }
        if let Some(value) = file.ffmpeg_bin {
            self.supervisor.program = value;
        }
        if let Some(value) = file.ffmpeg_log_level {
            self.ffmpeg_log_level = value;
        }
        if let Some(value) = file.default_profiles {
            self.default_profiles = value;
        }
        if let Some(secs) = file.graceful_timeout_secs {
            self.supervisor.graceful_timeout = Duration::from_secs(secs);
        }
        if let Some(millis) = file.drain_join_timeout_ms {
            self.supervisor.drain_join_timeout = Duration::from_millis(millis);
        }
        if let Some(classifier) = file.classifier {
            self.supervisor.classifier = classifier;
        }
        if let Some(profiles) = file.profiles {
            self.registry = ProfileRegistry::from_profiles(profiles)?;
        }
        Ok(())
    }

    /// Overrides settings from `RELAY_*` variables; unparseable numbers are ignored.
    pub fn apply_env(&mut self) {
        if let Some(value) = env_string(ENV_INPUT_URL) {
            self.input_url = value;
        }
        if let Some(value) = env_string(ENV_OUTPUT_BASE_URL) {
            self.output_base_url = value;
        }
        if let Some(value) = env_string(ENV_FFMPEG_BIN) {
            self.supervisor.program = PathBuf::from(value);
        }
        if let Some(value) = env_string(ENV_FFMPEG_LOGLEVEL) {
            self.ffmpeg_log_level = value;
        }
        if let Some(names) = env_list(ENV_PROFILES) {
            self.default_profiles = names;
        }

        if let Some(secs) = env::var(ENV_GRACEFUL_TIMEOUT_SECS)
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
        {
            self.supervisor.graceful_timeout = Duration::from_secs(secs);
        }

        if let Some(millis) = env::var(ENV_DRAIN_JOIN_TIMEOUT_MS)
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
        {
            self.supervisor.drain_join_timeout = Duration::from_millis(millis);
        }

        if let Some(markers) = env_list(ENV_PROGRESS_MARKERS) {
            self.supervisor.classifier.progress_markers = markers;
        }
        if let Some(keywords) = env_list(ENV_ERROR_KEYWORDS) {
            self.supervisor.classifier.error_keywords = keywords;
        }
    }

    /// Checks both URLs and strips a trailing `/` from the output base.
    pub fn validate(&mut self) -> Result<(), TranscodeError> {
        Url::parse(&self.input_url).map_err(|err| {
            TranscodeError::config(format!("input url '{}': {err}", self.input_url))
        })?;

        let trimmed = self.output_base_url.trim_end_matches('/').to_string();
        Url::parse(&trimmed).map_err(|err| {
            TranscodeError::config(format!("output url '{}': {err}", self.output_base_url))
        })?;
        self.output_base_url = trimmed;

        if self.ffmpeg_log_level.trim().is_empty() {
            return Err(TranscodeError::config("ffmpeg log level must not be empty"));
        }

        Ok(())
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            log_level: self.ffmpeg_log_level.clone(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = env_string(key)?;
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() { None } else { Some(items) }
}
