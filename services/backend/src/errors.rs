use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine::EngineError;
use serde_json::json;
use shared::errors::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn service_error(self) -> ServiceError {
        match self {
            AppError::Engine(e) => e.into(),
            AppError::InvalidInput(msg) => ServiceError::invalid_input(msg),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                ServiceError::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = self.service_error();
        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match error.category.log_level() {
            "error" => tracing::error!(code = %error.code, message = %error.message, "Request failed"),
            "warn" => tracing::warn!(code = %error.code, message = %error.message, "Request rejected"),
            _ => tracing::info!(code = %error.code, message = %error.message, "Request rejected"),
        }
        metrics::counter!(
            "errors_total",
            "category" => error.category.as_str(),
            "code" => error.code.clone()
        )
        .increment(1);

        let body = Json(json!({
            "error": {
                "code": error.code,
                "message": error.message,
                "category": error.category.as_str(),
                "context": error.context,
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
