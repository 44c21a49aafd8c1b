use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, TaskflowError>;

#[derive(Debug, Error)]
pub enum TaskflowError {
    /// Caller-supplied data failed a precondition.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An update targeted a task id the active backend does not hold.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The remote backend could not serve the call (network, permission,
    /// malformed response, timeout).
    #[error("remote backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The device store could not be read or written.
    #[error("storage failure: {message}")]
    StorageFailure {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Persisted local data could not be parsed.
    #[error("corrupt local state: {0}")]
    CorruptState(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TaskflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskflowError::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        TaskflowError::BackendUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        TaskflowError::StorageFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a remote failure of this kind demotes the caller to the
    /// local backend. Validation and not-found outcomes are answers from
    /// the backend, not outages.
    pub fn triggers_fallback(&self) -> bool {
        !matches!(
            self,
            TaskflowError::Validation(_) | TaskflowError::NotFound(_)
        )
    }
}

impl From<reqwest::Error> for TaskflowError {
    fn from(err: reqwest::Error) -> Self {
        TaskflowError::BackendUnavailable {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<std::io::Error> for TaskflowError {
    fn from(err: std::io::Error) -> Self {
        TaskflowError::StorageFailure {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for TaskflowError {
    fn from(err: serde_json::Error) -> Self {
        TaskflowError::StorageFailure {
            message: format!("serialization: {}", err),
            source: Some(Box::new(err)),
        }
    }
}
