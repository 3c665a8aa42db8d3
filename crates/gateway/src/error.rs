use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hustle_core::error::ErrorKind;
use hustle_core::HustleError;
use serde::{Deserialize, Serialize};
use upload::ProofUpload;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    pub retryable: bool,
    /// Proof that stays pinned after a failure past the upload step. Sending
    /// its `manifest_cid` back as `proof_reference` skips the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofUpload>,
}

impl From<&HustleError> for ErrorBody {
    fn from(e: &HustleError) -> Self {
        Self {
            error: e.to_string(),
            kind: e.kind(),
            retryable: e.is_retryable(),
            proof: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub error: HustleError,
    pub proof: Option<ProofUpload>,
}

impl ApiError {
    pub fn with_proof(mut self, proof: ProofUpload) -> Self {
        self.proof = Some(proof);
        self
    }
}

impl<E: Into<HustleError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError {
            error: e.into(),
            proof: None,
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::NoIdentity => StatusCode::UNAUTHORIZED,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidState | ErrorKind::InFlight => StatusCode::CONFLICT,
        ErrorKind::TransientFetch => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::WriteRejected | ErrorKind::FinalizationFailed | ErrorKind::UploadFailed => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.error.kind());
        if status.is_server_error() {
            tracing::warn!(error = %self.error, "request failed");
        }
        let mut body = ErrorBody::from(&self.error);
        body.proof = self.proof;
        (status, Json(body)).into_response()
    }
}
