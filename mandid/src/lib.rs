#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod cli;
pub use cli::Cli;

mod config;
pub use config::{AppConfig, SchedulerConfig};
