//! Gateway error taxonomy and its mapping to the transport boundary.
//!
//! Only true failures are errors: missing input and unknown identifiers.
//! Business-flow signals (payment required, already completed) are returned
//! as structured results from the dispatcher, never as errors. Every error
//! is per-request; nothing here is fatal to the process.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::external::UpstreamError;
use crate::ledger::LedgerError;
use crate::types::PaymentId;

/// JSON error body at the transport boundary.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A required identifying field is absent. No state was mutated.
    #[error("Missing {0}")]
    MissingInput(&'static str),
    /// An unknown payment id was referenced. No state was mutated.
    #[error("Payment request not found: {0}")]
    PaymentNotFound(PaymentId),
    /// The request names an API that is not in the catalog.
    #[error("API not found: {0}")]
    UnknownResource(String),
    /// The upstream collaborator failed to produce a payload. The payment,
    /// if any, stands: it bought the right to access, not the response.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => GatewayError::PaymentNotFound(id),
        }
    }
}

impl GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::UnknownResource(_) => StatusCode::NOT_FOUND,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
