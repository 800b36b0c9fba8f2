use diesel::result::Error as DieselError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Diesel error: {0}")]
    DieselError(#[from] DieselError),
    #[error("Pool error: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Unknown task '{0}'")]
    UnknownTask(String),
    #[error("Unknown article '{0}'")]
    UnknownArticle(String),
    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Classification of a stage failure. The kind alone decides whether the
/// lease manager schedules a retry; stage code never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    /// No usable model/prompt configuration, or a bad override reference.
    Config,
    /// Missing or malformed input/output; retrying cannot help.
    Data,
    /// The model call exceeded its deadline.
    Timeout,
    /// Any other upstream failure (network, non-2xx, unexpected).
    External,
}

impl StageErrorKind {
    pub fn retryable(self) -> bool {
        matches!(self, StageErrorKind::Timeout | StageErrorKind::External)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageErrorKind::Config => "config",
            StageErrorKind::Data => "data",
            StageErrorKind::Timeout => "timeout",
            StageErrorKind::External => "external",
        }
    }
}

/// Error raised by a pipeline stage routine, carrying its retry class.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} error: {message}", kind.as_str())]
pub struct StageError {
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageError {
    pub fn config(message: impl Into<String>) -> Self {
        StageError {
            kind: StageErrorKind::Config,
            message: message.into(),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        StageError {
            kind: StageErrorKind::Data,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        StageError {
            kind: StageErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        StageError {
            kind: StageErrorKind::External,
            message: message.into(),
        }
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

/// Storage failures surfacing inside a stage routine count as retryable
/// external failures; sqlite contention clears on a later attempt.
impl From<Error> for StageError {
    fn from(err: Error) -> Self {
        StageError::external(err.to_string())
    }
}
