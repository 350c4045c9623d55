//! Rejections produced by the admission pipeline and their wire format.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use policy_eval_sdk::{EvalError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_INVALID_PARAMETER: &str = "invalid_parameter";
pub const CODE_UNAUTHORIZED: &str = "unauthorized";
pub const CODE_INTERNAL: &str = "internal";

pub const MSG_UNAUTHORIZED: &str = "request rejected by administrative policy";
pub const MSG_UNDEFINED_DECISION: &str = "authorization policy missing or undefined";
pub const MSG_INVALID_DECISION: &str = "document missing or undefined";
pub const MSG_EVALUATION: &str = "error(s) occurred while evaluating query";
pub const MSG_SNAPSHOT: &str = "error(s) occurred while reading policy data";

const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Error body returned with every rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorV1 {
    pub code: String,
    pub message: String,
}

impl ErrorV1 {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Why a request was not admitted.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid URL path: {0}")]
    InvalidPath(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Denied by policy, optionally with a policy-supplied reason.
    #[error("{}", .0.as_deref().unwrap_or(MSG_UNAUTHORIZED))]
    Unauthorized(Option<String>),

    #[error("{MSG_UNDEFINED_DECISION}")]
    UndefinedDecision,

    /// The decision had a shape other than a boolean or an `allowed` object.
    #[error("{MSG_INVALID_DECISION}")]
    InvalidDecision,

    #[error("{MSG_EVALUATION}")]
    Evaluation(#[source] EvalError),

    #[error("{MSG_SNAPSHOT}")]
    Snapshot(#[source] StoreError),
}

impl AdmissionError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPath(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::UndefinedDecision
            | Self::InvalidDecision
            | Self::Evaluation(_)
            | Self::Snapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) | Self::InvalidBody(_) => CODE_INVALID_PARAMETER,
            Self::Unauthorized(_) => CODE_UNAUTHORIZED,
            Self::UndefinedDecision
            | Self::InvalidDecision
            | Self::Evaluation(_)
            | Self::Snapshot(_) => CODE_INTERNAL,
        }
    }

    /// Wire body for this rejection. Sources of internal errors are not
    /// included.
    #[must_use]
    pub fn to_error_v1(&self) -> ErrorV1 {
        ErrorV1::new(self.code(), self.to_string())
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.to_error_v1();
        let bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode error response");
                br#"{"code":"internal","message":"internal error"}"#.to_vec()
            }
        };

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
        response
    }
}
