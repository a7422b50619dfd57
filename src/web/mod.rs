//! HTTP error mapping for the mock store server.

use crate::core::{DashboardError, ErrorKind};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Store(DashboardError),
    Input(String),
    NotFound(String),
    Internal(String),
}

impl From<DashboardError> for WebError {
    fn from(err: DashboardError) -> Self {
        WebError::Store(err)
    }
}

fn status_of(kind: ErrorKind) -> (StatusCode, &'static str) {
    match kind {
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
        ErrorKind::Validation | ErrorKind::InvalidInput | ErrorKind::InvalidRelation => {
            (StatusCode::UNPROCESSABLE_ENTITY, "input_error")
        }
        ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        ErrorKind::Network => (StatusCode::BAD_GATEWAY, "upstream_error"),
        ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

impl WebError {
    fn parts(self) -> (StatusCode, String, String) {
        let (status, code, message) = match self {
            WebError::Store(err) => {
                let (status, code) = match &err {
                    // Upstream HTTP failures keep the upstream status.
                    DashboardError::Network {
                        status: Some(upstream),
                        ..
                    } => (
                        StatusCode::from_u16(*upstream).unwrap_or(StatusCode::BAD_GATEWAY),
                        "upstream_error",
                    ),
                    other => status_of(other.kind()),
                };
                (status, code, err.to_string())
            }
            WebError::Input(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "input_error", msg),
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            WebError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };
        (status, message, code.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = self.parts();
        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
