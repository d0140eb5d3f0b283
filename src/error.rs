use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::auth::AuthError;
use crate::storage::ImageStoreError;
use crate::store::StoreError;
use crate::validation::ValidationError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("unauthorized")] Unauthorized,
    #[error("not found")] NotFound,
    #[error("{0}")] Conflict(String),
    #[error("internal error")] Internal,
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self { ApiError::BadRequest(e.to_string()) }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => v.into(),
            other => {
                tracing::error!(error = %other, "store failure");
                ApiError::Internal
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(v) => v.into(),
            AuthError::EmailInUse => ApiError::Conflict(e.to_string()),
            AuthError::InvalidCredentials | AuthError::NotSignedIn | AuthError::Revoked => ApiError::Unauthorized,
            AuthError::Token(err) => {
                tracing::error!(error = %err, "token failure");
                ApiError::Internal
            }
        }
    }
}

impl From<ImageStoreError> for ApiError {
    fn from(e: ImageStoreError) -> Self {
        match e {
            ImageStoreError::NotFound => ApiError::NotFound,
            ImageStoreError::Duplicate => ApiError::Conflict(e.to_string()),
            ImageStoreError::Other(_) => ApiError::Internal,
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
