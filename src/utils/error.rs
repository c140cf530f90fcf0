use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provedores::ProviderError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Provedor { status: Option<u16>, detalhe: String },
    ConfigError(String),
    NaoEncontrado(String),
    JsonError(serde_json::Error),
    HttpError(reqwest::Error),
    ValidationError(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Provedor { status, detalhe } => {
                write!(f, "Provider error (status {:?}): {}", status, detalhe)
            }
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::NaoEncontrado(msg) => write!(f, "Not found: {}", msg),
            AppError::JsonError(err) => write!(f, "JSON error: {}", err),
            AppError::HttpError(err) => write!(f, "HTTP error: {}", err),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::HttpError(err)
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match &err {
            // Credencial ausente ou destinatário inválido é erro da requisição,
            // não indisponibilidade do provedor
            ProviderError::Config(msg) => AppError::ValidationError(msg.clone()),
            _ => AppError::Provedor {
                status: err.status(),
                detalhe: err.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Provedor { detalhe, .. } => (StatusCode::BAD_GATEWAY, detalhe),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NaoEncontrado(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::JsonError(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::HttpError(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = json!({
            "error": error_message,
            "status": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
