use thiserror::Error;

/// Failure of a backend request. The console treats every kind the same way:
/// undo the optimistic change and hand the error to the notifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("HTTP {status} from {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },
    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },
    #[error("unknown resource action {0}")]
    UnknownAction(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
