//! User-facing error type for the CLI boundary.
//!
//! Engine errors stay typed (`AdvanceError`, `StoreError`, ...) until a
//! command returns; only then are they folded into an [`AppError`] carrying
//! a stable `SF-*` code, keyed context and hints for the operator.

use crate::core::types::{ErrorCategory, ErrorSeverity};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    /// Identifiers involved in the failure, such as instance or view.
    pub context: BTreeMap<String, String>,
    pub recovery_suggestions: Vec<String>,
    pub source: Option<anyhow::Error>,
}

/// Caller mistakes the operator can correct are warnings; anything that
/// points at a broken definition or workspace is an error.
fn severity_of(category: ErrorCategory) -> ErrorSeverity {
    match category {
        ErrorCategory::RoutingError
        | ErrorCategory::TerminalError
        | ErrorCategory::ConflictError => ErrorSeverity::Warning,
        ErrorCategory::Unknown => ErrorSeverity::Info,
        _ => ErrorSeverity::Error,
    }
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        AppError {
            category,
            severity: severity_of(category),
            code: "SF-ERROR".to_string(),
            message: message.into(),
            context: BTreeMap::new(),
            recovery_suggestions: Vec::new(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_suggestion<T: Into<String>>(mut self, suggestion: T) -> Self {
        self.recovery_suggestions.push(suggestion.into());
        self
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    /// Multi-line rendering used by the CLI on stderr.
    pub fn render(&self) -> String {
        let label = match self.severity {
            ErrorSeverity::Warning => "WARNING",
            _ => "ERROR",
        };
        let mut out = format!("[{}] {}: {}", label, self.code, self.message);
        if !self.context.is_empty() {
            let pairs: Vec<String> = self
                .context
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            let _ = write!(out, "\n  Context: {}", pairs.join(" "));
        }
        for suggestion in &self.recovery_suggestions {
            let _ = write!(out, "\n  Hint: {}", suggestion);
        }
        if let Some(ref source) = self.source {
            let _ = write!(out, "\n  Caused by: {}", source);
        }
        out
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError {
            message: format!("{e:#}"),
            source: Some(e),
            ..AppError::new(ErrorCategory::InternalError, "").with_code("SF-INTERNAL-001")
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::with_source(ErrorCategory::IoError, e.to_string(), Box::new(e))
            .with_code("SF-IO-001")
            .with_suggestion("check that the workspace directories exist and are writable")
    }
}

/// Sink for failures that end a command.
pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
    fn report_warning(&self, message: &str);
}

/// Writes reports to stderr, keeping stdout clean for `--format json`.
#[derive(Debug, Default)]
pub struct StderrReporter;

impl ErrorReporter for StderrReporter {
    fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.render());
    }

    fn report_warning(&self, message: &str) {
        eprintln!("[WARNING] {}", message);
    }
}
