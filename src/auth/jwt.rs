use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

// Claims carried by both tokens of a pair
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub user_id: i32,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token is not an access token")]
    WrongType,
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

impl JwtConfig {
    pub fn new(secret: &str, access_token_minutes: i64, refresh_token_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_minutes,
            refresh_token_days,
        }
    }

    /// Issue a fresh access + refresh pair for `user_id`.
    pub fn create_token_pair(&self, user_id: i32) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        Ok(TokenPair {
            refresh: self.create_token(
                user_id,
                TokenType::Refresh,
                Duration::days(self.refresh_token_days),
            )?,
            access: self.create_token(
                user_id,
                TokenType::Access,
                Duration::minutes(self.access_token_minutes),
            )?,
        })
    }

    fn create_token(
        &self,
        user_id: i32,
        token_type: TokenType,
        lifetime: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            token_type,
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
            user_id,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Validate an access token and return the user id it was issued to.
    pub fn validate_access_token(&self, token: &str) -> Result<i32, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default()).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e),
            },
        )?;
        if data.claims.token_type != TokenType::Access {
            return Err(TokenError::WrongType);
        }
        Ok(data.claims.user_id)
    }
}
