//! Request-scoped caller identity.
//!
//! `AuthContext` is an actix extractor: adding it to a handler's
//! arguments makes the route require a valid access token, and hands the
//! handler the resolved user explicitly.

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{FromRequest, HttpRequest, web};
use futures::future::LocalBoxFuture;

use crate::auth::jwt::{JwtConfig, TokenError};
use crate::errors::ApiError;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i32,
    pub username: String,
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::TokenExpired,
            other => {
                tracing::debug!(error = %other, "Rejected bearer token");
                ApiError::Unauthenticated
            }
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl FromRequest for AuthContext {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let jwt = req.app_data::<web::Data<JwtConfig>>().cloned();
        let store = req.app_data::<web::Data<dyn Store>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let (Some(jwt), Some(store)) = (jwt, store) else {
                return Err(ApiError::Internal("auth gate is missing app data".into()));
            };
            let token = token.ok_or(ApiError::Unauthenticated)?;
            let user_id = jwt.validate_access_token(&token)?;

            // The user must still exist, not just the signature be valid.
            let user = web::block(move || store.find_user(user_id))
                .await??
                .ok_or(ApiError::Unauthenticated)?;

            Ok(AuthContext {
                user_id: user.id,
                username: user.username,
            })
        })
    }
}
