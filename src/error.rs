use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::utils::html::escape_html;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("CSRF mismatch: {0}")]
    CsrfMismatch(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider timeout: {0}")]
    ProviderTimeout(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classify a reqwest failure from one of the provider endpoints.
    pub fn from_provider(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::ProviderTimeout(format!("{}: {}", context, err))
        } else {
            AppError::ProviderUnavailable(format!("{}: {}", context, err))
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::CsrfMismatch(_) => StatusCode::FORBIDDEN,
            AppError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Session(_)
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Csv(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (title, message) = match &self {
            AppError::Unauthenticated(ref e) => ("Not authenticated", e.clone()),
            AppError::CsrfMismatch(ref e) => {
                tracing::warn!("CSRF mismatch: {}", e);
                ("Login rejected", e.clone())
            }
            AppError::ProviderUnavailable(ref e) => {
                tracing::error!("Provider unavailable: {}", e);
                ("Provider unavailable", e.clone())
            }
            AppError::ProviderTimeout(ref e) => {
                tracing::error!("Provider timeout: {}", e);
                ("Provider timed out", e.clone())
            }
            AppError::MalformedResponse(ref e) => {
                tracing::error!("Malformed provider response: {}", e);
                ("Unexpected provider response", e.clone())
            }
            AppError::BadRequest(ref e) => ("Bad request", e.clone()),
            AppError::Session(ref e) => {
                tracing::error!("Session error: {:?}", e);
                ("Session error", "Session could not be loaded".to_string())
            }
            AppError::Config(ref e) => {
                tracing::error!("Configuration error: {:?}", e);
                ("Server misconfigured", "Configuration error".to_string())
            }
            AppError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                ("Storage error", "Failed to write sleep data".to_string())
            }
            AppError::Csv(ref e) => {
                tracing::error!("CSV error: {:?}", e);
                ("Storage error", "Failed to write sleep data".to_string())
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                ("Internal error", "Internal server error".to_string())
            }
        };

        let body = format!(
            "<h1>{}</h1><p>{}</p><p><a href=\"/login\">Try again</a></p>",
            escape_html(title),
            escape_html(&message)
        );

        (status, Html(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::CsrfMismatch("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::ProviderUnavailable("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::ProviderTimeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::MalformedResponse("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_timeout_classification_keeps_context() {
        let err = AppError::ProviderTimeout("Sleep data request: deadline".into());
        assert!(err.to_string().contains("Sleep data request"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
