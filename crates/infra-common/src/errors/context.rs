use crate::errors::types::Error;
use std::fmt;

/// Where an error happened: which component, during which operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Component where the error occurred, e.g. `call-registry`
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional detail such as a call index
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in component '{}' during operation '{}'", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Extension trait for attaching [`ErrorContext`] to errors and results
pub trait ErrorExt<T> {
    /// Attach a full context
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error>;

    /// Attach a component/operation pair
    fn with_context<S: Into<String>, O: Into<String>>(
        self,
        component: S,
        operation: O,
    ) -> std::result::Result<T, Error>;
}

impl<T> ErrorExt<T> for std::result::Result<T, Error> {
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error> {
        self.map_err(|err| match err {
            Error::Custom(msg) => Error::Custom(format!("{} [{}]", msg, ctx)),
            Error::Internal(msg) => Error::Internal(format!("{} [{}]", msg, ctx)),
            Error::Config(msg) => Error::Config(format!("{} [{}]", msg, ctx)),
            other => Error::Custom(format!("{} [{}]", other, ctx)),
        })
    }

    fn with_context<S: Into<String>, O: Into<String>>(
        self,
        component: S,
        operation: O,
    ) -> std::result::Result<T, Error> {
        self.context(ErrorContext::new(component, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_display_includes_details() {
        let ctx = ErrorContext::new("call-registry", "remove").with_details("call 7");
        assert_eq!(
            ctx.to_string(),
            "in component 'call-registry' during operation 'remove' (call 7)"
        );
    }

    #[test]
    fn ok_results_pass_through() {
        let ok: std::result::Result<u32, Error> = Ok(3);
        assert_eq!(ok.with_context("config", "load").ok(), Some(3));
    }

    #[test]
    fn config_errors_keep_their_kind() {
        let err: std::result::Result<(), Error> = Err(Error::config("missing field"));
        match err.with_context("config", "load") {
            Err(Error::Config(msg)) => {
                assert!(msg.starts_with("missing field ["));
                assert!(msg.contains("'config'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
