//! # dynbridge
//!
//! Command-line front end for native bridge artifacts.
//!
//! ## Philosophy
//!
//! - **Thin over the runtime**: every command goes through the same
//!   manifest, verification, and dispatch path a library caller uses
//! - **Stdout is the report**: logs go to stderr, results are plain text or JSON
//! - **No hidden state**: one command per process

pub mod commands;
pub mod json;
pub mod logging;

pub use commands::{parse_args, run, usage, CliError, Command, Invocation};
pub use logging::{init_logging, LogFormat, LogLevel, LogSettings};
