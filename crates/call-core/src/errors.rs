//! Error types for the call-control core

use crate::types::CallState;
use thiserror::Error;

/// Result type for call-control operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors returned by call operations.
///
/// A returned error means no state change happened, except for
/// [`CallError::HookFailed`], which is reported after the call was driven
/// into CriticalError.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    /// Operation requested outside its permitted states
    #[error("{operation} not allowed in state {state}")]
    InvalidState { operation: &'static str, state: CallState },

    /// Transfer target is one of the caller's own numbers
    #[error("Transfer to own number is not allowed")]
    SelfDialNotAllowed,

    /// Transfer target is the emergency number
    #[error("Transfer to emergency number is not allowed")]
    EmergencyTransferNotAllowed,

    #[error("No protocol manager bound to call")]
    ProtocolManagerMissing,

    #[error("No protocol call bound to call")]
    ProtocolCallMissing,

    /// A protocol-specific state hook failed
    #[error("State hook for {state} failed: {message}")]
    HookFailed { state: CallState, message: String },

    /// A terminal call was asked to go back to Connecting
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: CallState, to: CallState },

    /// The state cannot be set through the transition driver
    #[error("{state} is not a valid transition target")]
    IllegalTarget { state: CallState },

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The signaling or media collaborator reported a failure
    #[error("Collaborator error: {message}")]
    Collaborator { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CallError {
    pub fn invalid_state(operation: &'static str, state: CallState) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

impl From<vrs_infra_common::Error> for CallError {
    fn from(err: vrs_infra_common::Error) -> Self {
        CallError::config(err.to_string())
    }
}

/// Errors from parsing the `SInfo:` metadata format
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The text does not start with the expected header
    #[error("Metadata header missing (received {received:?})")]
    MissingHeader { received: String },

    /// An element is not terminated by an unescaped `|`
    #[error("Metadata element is not terminated")]
    MissingTerminator,

    /// An element is shorter than its 4 digit tag
    #[error("Metadata element shorter than its tag")]
    ElementTooShort,
}

/// Report a condition that indicates a programming defect.
///
/// Logs at error level. With the `strict-invariants` feature the condition
/// also panics.
#[macro_export]
macro_rules! invariant_violation {
    ($($arg:tt)+) => {{
        tracing::error!("Invariant violated: {}", format_args!($($arg)+));
        #[cfg(feature = "strict-invariants")]
        panic!($($arg)+);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_operation_and_state() {
        let err = CallError::invalid_state("answer", CallState::Disconnected);
        assert_eq!(err.to_string(), "answer not allowed in state Disconnected");
    }

    #[test]
    fn metadata_errors_convert() {
        let err: CallError = MetadataError::MissingTerminator.into();
        assert!(matches!(err, CallError::Metadata(MetadataError::MissingTerminator)));
    }
}
