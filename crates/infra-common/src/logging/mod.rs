//! Logging setup and contextual spans built on `tracing`

pub mod context;
pub mod setup;
