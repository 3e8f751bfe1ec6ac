//! Error type for the HTTP service.
//!
//! Wraps dispatch failures from `offload` together with request validation
//! errors and maps each case onto an HTTP status code with a small JSON body
//! of the form `{"error": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = core::result::Result<T, ServiceError>;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// The client request was malformed or exceeded the configured bounds.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Dispatch(#[from] offload::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Dispatch(err) => match err {
                offload::Error::TaskFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                offload::Error::PoolExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
                offload::Error::HostShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                offload::Error::TaskTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                offload::Error::WorkerCrashed { .. }
                | offload::Error::OrphanReply { .. }
                | offload::Error::WorkerSpawn { .. }
                | offload::Error::InvalidConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
