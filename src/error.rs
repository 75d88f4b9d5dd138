use std::{fmt::Display, io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    #[error("no valid profiles selected (requested: {})", .requested.join(", "))]
    NoValidProfiles { requested: Vec<String> },
    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading {stream} failed: {source}")]
    StreamDrain {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("waiting on transcoder failed: {0}")]
    Wait(#[source] io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TranscodeError {
    pub fn config(message: impl Display) -> Self {
        Self::Config(message.to_string())
    }

    pub fn spawn(program: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    pub fn no_valid_profiles<S: AsRef<str>>(requested: &[S]) -> Self {
        Self::NoValidProfiles {
            requested: requested.iter().map(|name| name.as_ref().to_owned()).collect(),
        }
    }

    /// Process exit status the binary reports for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnknownProfile(_) | Self::NoValidProfiles { .. } | Self::Config(_) => 2,
            Self::Spawn { .. } => 3,
            Self::StreamDrain { .. } | Self::Wait(_) | Self::Io(_) => 4,
        }
    }
}
