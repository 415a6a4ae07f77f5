/// Error types for the track transform engine
///
/// Two layers: `OpError` is a per-element failure that the engine recovers
/// from (skip and count), `EngineError` aborts a whole operation.
use thiserror::Error;

/// Failure of one pure combine step on a single key, position, region or cell
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpError {
    #[error("math error: {0}")]
    Math(String),

    #[error("type mismatch: cannot combine {left} with {right}")]
    TypeMismatch { left: String, right: String },

    #[error("missing operand value for '{0}'")]
    MissingOperand(String),

    #[error("no property '{0}'")]
    MissingProperty(String),

    #[error("property '{0}' is read-only")]
    ReadOnlyProperty(String),

    #[error("{0}")]
    Other(String),
}

/// Failure of a whole operation
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad parameters, unresolvable references or incompatible operand types.
    /// Raised before any sequence task starts.
    #[error("{}", format_config(.message, .line))]
    Config { message: String, line: Option<usize> },

    /// Cooperative cancellation reached a checkpoint. Not a failure; callers
    /// turn this into an aborted outcome.
    #[error("operation aborted")]
    Cancelled,

    /// Unexpected failure inside one sequence task
    #[error("task for sequence '{sequence}' failed: {message}")]
    TaskFailed { sequence: String, message: String },

    /// Scheduler bookkeeping did not add up
    #[error("internal error: {0}")]
    Internal(String),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

fn format_config(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("configuration error at line {line}: {message}"),
        None => format!("configuration error: {message}"),
    }
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config {
            message: message.into(),
            line: None,
        }
    }

    /// Attach a protocol line number to a configuration error. Other variants
    /// are returned unchanged.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            EngineError::Config { message, .. } => EngineError::Config {
                message,
                line: Some(line),
            },
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
