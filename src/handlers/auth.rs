use actix_web::{HttpResponse, web};
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::JwtConfig;
use crate::crypto::CryptoUtils;
use crate::errors::ApiError;
use crate::models::User;
use crate::serializers::{self, RegisterResponse};
use crate::store::Store;

// POST /auth/register/
pub async fn register(
    store: web::Data<dyn Store>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let input = serializers::register_input(&body)?;

    // Argon2 is CPU-bound; run it on the blocking pool
    let user = web::block(move || -> Result<User, ApiError> {
        let password_hash = CryptoUtils::hash_password(&input.password)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(store.create_user(input.into_new_user(password_hash))?)
    })
    .await??;

    info!(user_id = user.id, "Registered user {}", user);
    Ok(HttpResponse::Created().json(RegisterResponse::from(user)))
}

// POST /auth/login/
pub async fn login(
    store: web::Data<dyn Store>,
    jwt: web::Data<JwtConfig>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let input = serializers::login_input(&body)?;
    let username = input.username.clone();

    let user = web::block(move || -> Result<Option<User>, ApiError> {
        let Some(user) = store.find_user_by_username(&input.username)? else {
            CryptoUtils::burn_verification(&input.password);
            return Ok(None);
        };
        let valid = CryptoUtils::verify_password(&input.password, &user.password_hash)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(valid.then_some(user))
    })
    .await??;

    let Some(user) = user else {
        warn!(username = %username, "Rejected login");
        return Err(ApiError::InvalidCredentials);
    };

    let tokens = jwt
        .create_token_pair(user.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(user_id = user.id, "User {} logged in", user);
    Ok(HttpResponse::Ok().json(tokens))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/register/").route(web::post().to(register)))
        .service(web::resource("/auth/login/").route(web::post().to(login)));
}
