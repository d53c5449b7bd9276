//! API error types with structured JSON responses.

use std::collections::BTreeMap;

use actix_web::error::{BlockingError, JsonPayloadError, PathError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::store::StoreError;

/// Field name -> messages, in the shape clients render next to form inputs.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid input")]
    Validation(FieldErrors),
    #[error("No active account found with the given credentials")]
    InvalidCredentials,
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Token expired")]
    TokenExpired,
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Single-field validation failure.
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(name.to_string(), vec![message.into()]);
        ApiError::Validation(fields)
    }

    pub fn non_field(message: impl Into<String>) -> Self {
        Self::field(NON_FIELD_ERRORS, message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthenticated | ApiError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (code, message, fields) = match self {
            ApiError::Validation(fields) => (
                "VALIDATION_ERROR",
                "Invalid input".to_string(),
                Some(fields.clone()),
            ),
            ApiError::InvalidCredentials => (
                "INVALID_CREDENTIALS",
                "No active account found with the given credentials".to_string(),
                None,
            ),
            ApiError::Unauthenticated => (
                "AUTH_REQUIRED",
                "Authentication credentials were not provided or are invalid".to_string(),
                None,
            ),
            ApiError::TokenExpired => (
                "TOKEN_EXPIRED",
                "Token expired, re-authenticate".to_string(),
                None,
            ),
            ApiError::NotFound(detail) => ("NOT_FOUND", detail.clone(), None),
            ApiError::UnsupportedMediaType(detail) => {
                ("UNSUPPORTED_MEDIA_TYPE", detail.clone(), None)
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                (
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: ErrorDetail {
                code,
                message,
                fields,
            },
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => {
                ApiError::field("username", "A user with that username already exists.")
            }
            StoreError::MissingReference { field, id } => {
                ApiError::field(field, format!("Invalid pk \"{id}\" - object does not exist."))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        ApiError::Internal(format!("Error blocking thread: {err}"))
    }
}

/// Installed on `web::JsonConfig` so malformed bodies share the error shape.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let err = match &err {
        JsonPayloadError::ContentType => ApiError::UnsupportedMediaType(
            "Unsupported media type in request, expected application/json".to_string(),
        ),
        JsonPayloadError::Deserialize(e) => ApiError::non_field(format!("JSON parse error - {e}")),
        other => ApiError::non_field(other.to_string()),
    };
    err.into()
}

/// Installed on `web::PathConfig`: a non-numeric id never matches a record.
pub fn path_error_handler(_err: PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::NotFound("No record matches the given query.".to_string()).into()
}
