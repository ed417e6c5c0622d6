//! Handler-facing error type.
//!
//! Store and CLI layers use `anyhow`; HTTP handlers return [`WebError`],
//! which renders to a redirect (unauthenticated browsers), a plain status,
//! or a JSON `{"error": {"code", "message"}}` body matching what the
//! data-table clients expect.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum WebError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found")]
    NotFound,

    #[error("authentication required")]
    Unauthenticated,

    #[error("insufficient privileges")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("webauthn error: {0}")]
    Webauthn(String),

    #[error("OAuth flow error: {0}")]
    OauthFlow(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// JSON error body: `{"error": {"code": 401, "message": "..."}}`.
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

impl ApiErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorBody {
                code: status.as_u16(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            // Browsers without a session get sent to the login form.
            WebError::Unauthenticated => Redirect::to("/auth/login").into_response(),

            WebError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(ApiErrorResponse::new(
                    StatusCode::FORBIDDEN,
                    "Insufficient privileges.",
                )),
            )
                .into_response(),

            WebError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),

            WebError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ApiErrorResponse::new(StatusCode::BAD_REQUEST, message)),
            )
                .into_response(),

            WebError::Webauthn(_) | WebError::OauthFlow(_) => (
                StatusCode::BAD_REQUEST,
                Json(ApiErrorResponse::new(
                    StatusCode::BAD_REQUEST,
                    "Authentication error.",
                )),
            )
                .into_response(),

            WebError::Database(err) => {
                tracing::error!(error = %err, "database error in handler");
                internal_error()
            }
            WebError::Template(err) => {
                tracing::error!(error = %err, "template render error");
                internal_error()
            }
            WebError::Json(err) => {
                tracing::error!(error = %err, "serialization error in handler");
                internal_error()
            }
            WebError::Internal(err) => {
                tracing::error!(error = %err, "internal error in handler");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiErrorResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal server error occurred.",
        )),
    )
        .into_response()
}
