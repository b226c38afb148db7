use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Handler failure; the display text is what clients see.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Stock no encontrado")]
    NotFound,

    #[error("Error interno del servidor")]
    Internal,

    /// Storage detail is logged and reported, never returned.
    #[error("{message}")]
    Storage {
        message: &'static str,
        detail: anyhow::Error,
    },
}

impl ApiError {
    pub fn storage(message: &'static str) -> impl FnOnce(anyhow::Error) -> ApiError {
        move |detail| ApiError::Storage { message, detail }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal | ApiError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Storage { message, detail } = &self {
            sentry_anyhow::capture_anyhow(detail);
            let detail = format!("{detail:#}");
            tracing::error!(error = %detail, "{message}");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
