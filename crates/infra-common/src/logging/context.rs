use std::collections::BTreeMap;
use std::fmt;
use tracing::{Level, Span};

/// Contextual fields attached to log output of one component
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    /// Component generating the log, e.g. `protocol-manager`
    pub component: String,
    /// Operation being performed
    pub operation: Option<String>,
    /// Additional fields, rendered in key order
    pub fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new<S: Into<String>>(component: S) -> Self {
        LogContext {
            component: component.into(),
            ..Default::default()
        }
    }

    pub fn with_operation<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        LogContext {
            component: component.into(),
            operation: Some(operation.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field<S: Into<String>, T: ToString>(mut self, key: S, value: T) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    /// Create a span carrying the component, operation and rendered fields
    pub fn span(&self, level: Level) -> Span {
        let operation = self.operation.as_deref().unwrap_or("");
        let fields = self.render_fields();
        match level {
            Level::TRACE => tracing::trace_span!("vrs", component = %self.component, operation, fields = %fields),
            Level::DEBUG => tracing::debug_span!("vrs", component = %self.component, operation, fields = %fields),
            Level::INFO => tracing::info_span!("vrs", component = %self.component, operation, fields = %fields),
            Level::WARN => tracing::warn_span!("vrs", component = %self.component, operation, fields = %fields),
            Level::ERROR => tracing::error_span!("vrs", component = %self.component, operation, fields = %fields),
        }
    }

    fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.component)?;
        if let Some(op) = &self.operation {
            write!(f, "[{}]", op)?;
        }
        for (key, value) in &self.fields {
            write!(f, "[{}={}]", key, value)?;
        }
        Ok(())
    }
}

/// Run `f` inside the span of `context`
pub fn with_context<F, R>(context: &LogContext, level: Level, f: F) -> R
where
    F: FnOnce() -> R,
{
    let span = context.span(level);
    let _guard = span.enter();
    f()
}

/// Emit an event inside the span of an existing [`LogContext`].
///
/// The level must be a `tracing::Level` constant.
#[macro_export]
macro_rules! log_with_context {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let span = $ctx.span($level);
        let _guard = span.enter();
        tracing::event!($level, $($arg)+);
    }};
}

/// Emit an event inside a fresh component/operation context
#[macro_export]
macro_rules! log_ctx {
    ($level:expr, $component:expr, $operation:expr, $($arg:tt)+) => {{
        let ctx = $crate::logging::context::LogContext::with_operation($component, $operation);
        $crate::log_with_context!($level, &ctx, $($arg)+);
    }};
}
