pub mod command;
pub mod config;
pub mod error;
pub mod profiles;
pub mod selection;
pub mod supervisor;

pub use command::{CompileOptions, TranscodeJob, compile, compile_with};
pub use config::RelayConfig;
pub use error::TranscodeError;
pub use profiles::{EncodingProfile, ProfileRegistry};
pub use selection::resolve;
pub use supervisor::{RunOutcome, Supervisor, SupervisorConfig, SupervisorState};
