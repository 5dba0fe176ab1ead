use memory::ErrorType;
use thiserror::Error;

/// Failures surfaced to the embedder once script execution has left the VM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("uncaught {message}")]
    Uncaught {
        message: String,
        /// Rendered stack trace captured at the throw site.
        trace: String,
    },
    #[error("execution terminated")]
    Terminated,
    #[error("VM entry is disallowed")]
    VmEntryDisallowed,
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("compile error: {0}")]
    Compile(String),
}

/// Returned by the source compiler collaborator. Rethrown into script as a
/// `SyntaxError` unless `error_type` says otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub error_type: ErrorType,
    pub message: String,
}

impl CompileError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::SyntaxError,
            message: message.into(),
        }
    }
}

impl From<String> for CompileError {
    fn from(s: String) -> Self {
        CompileError::syntax(s)
    }
}

impl From<&str> for CompileError {
    fn from(s: &str) -> Self {
        CompileError::syntax(s)
    }
}

impl From<toml::de::Error> for RuntimeError {
    fn from(e: toml::de::Error) -> Self {
        RuntimeError::InvalidOptions(e.to_string())
    }
}
