pub mod appointments;
pub mod auth;
pub mod doctors;
pub mod patients;

use crate::errors::ApiError;

// Simple health check handler
pub async fn health_check() -> &'static str {
    "OK"
}

// Unknown and non-owned ids look the same to the caller
fn not_found(resource: &str) -> ApiError {
    ApiError::NotFound(format!("No {resource} matches the given query."))
}
