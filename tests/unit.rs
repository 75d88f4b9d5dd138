#[path = "unit/config.rs"]
mod config;
#[path = "unit/error.rs"]
mod error;
