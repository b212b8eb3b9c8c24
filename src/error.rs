use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

// Based on https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct GatewayError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

/// The single-key `{"error": "..."}` body every failure is rendered as.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpErrorResponse {
    pub error: String,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse { error: message }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse {
            error: message.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status, Json(self.message)).into_response()
    }
}

impl<E> From<E> for GatewayError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        GatewayError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(err.into().to_string()),
        }
    }
}

pub type GatewayResult<T, E = GatewayError> = Result<T, E>;

/// Outcome of a failed scan. The HTTP layer turns each variant into a defined
/// status code instead of letting the failure escape as an unhandled fault.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("model failed to load: {0:#}")]
    ModelLoad(anyhow::Error),
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
    #[error("generation returned no output")]
    EmptyOutput,
    #[error("scan exceeded the {0:?} invocation timeout")]
    Timeout(Duration),
}

impl ScanError {
    pub fn status(&self) -> StatusCode {
        match self {
            ScanError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::Generation(_) | ScanError::EmptyOutput => StatusCode::BAD_GATEWAY,
            ScanError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    // The blanket `From` above would flatten every variant to a 500.
    pub fn into_gateway_error(self) -> GatewayError {
        GatewayError {
            status: self.status(),
            message: HttpErrorResponse::from(self.to_string()),
        }
    }
}

#[macro_export]
macro_rules! bail_gateway {
    ($error_message:expr) => {
        return Err($crate::error::GatewayError {
            status: ::axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
    ($status:expr, $error_message:expr) => {
        return Err($crate::error::GatewayError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)+) => {
        return Err($crate::error::GatewayError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from(format!($fmt $(, $arg)+)),
        })
    };
}
