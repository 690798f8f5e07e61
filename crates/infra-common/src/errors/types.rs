use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the infrastructure layer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or was invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O failure while reading configuration sources
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error with attached component context
    #[error("{0}")]
    Custom(String),

    /// Unexpected internal condition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
