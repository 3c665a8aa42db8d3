use serde::{Deserialize, Serialize};

/// Failure taxonomy shared by every layer of the client.
///
/// Not-found, unauthorized and invalid-state failures are terminal for the
/// current context. Fetch, write, finalization and upload failures are
/// retryable and must leave the caller's draft state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HustleError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no wallet connected")]
    NoIdentity,

    #[error("approval already in flight: {0}")]
    InFlight(String),

    #[error("fetch failed: {0}")]
    TransientFetch(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error("transaction did not finalize: {0}")]
    FinalizationFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidState,
    InvalidInput,
    NoIdentity,
    InFlight,
    TransientFetch,
    WriteRejected,
    FinalizationFailed,
    UploadFailed,
}

impl HustleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NoIdentity => ErrorKind::NoIdentity,
            Self::InFlight(_) => ErrorKind::InFlight,
            Self::TransientFetch(_) => ErrorKind::TransientFetch,
            Self::WriteRejected(_) => ErrorKind::WriteRejected,
            Self::FinalizationFailed(_) => ErrorKind::FinalizationFailed,
            Self::UploadFailed(_) => ErrorKind::UploadFailed,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientFetch(_)
                | Self::WriteRejected(_)
                | Self::FinalizationFailed(_)
                | Self::UploadFailed(_)
        )
    }
}
