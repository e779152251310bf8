use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

/// Failure while talking to the upstream search API. Terminal for the page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("malformed response body: {0}")]
    Decode(String),
    #[error("invalid search url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e)
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("value cannot be stored: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("user agent pool is empty")]
    EmptyIdentityPool,
}

/// Errors surfaced by the HTTP handlers as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Store(e) = self {
            tracing::error!(error = %e, "storage failure while serving request");
        }
        let err = serde_json::json!({ "error": format!("{self}") });
        HttpResponse::build(self.status_code()).json(err)
    }
}
