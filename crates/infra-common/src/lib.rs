//! Shared infrastructure for the VRS call-control crates.
//!
//! This crate carries the ambient pieces every component needs:
//!
//! - [`logging`]: `tracing` subscriber setup and contextual spans
//! - [`errors`]: the common error type plus component/operation context
//! - [`config`]: layered TOML + environment configuration loading

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
pub use errors::context::{ErrorContext, ErrorExt};
pub use logging::setup::{LoggingConfig, setup_logging, parse_log_level, log_welcome};
pub use logging::context::LogContext;
