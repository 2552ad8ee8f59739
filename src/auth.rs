//! JWT issuance and verification
//!
//! Tokens are stateless HS256 bearer tokens minted after OAuth login.
//! Logout is client-side (the token is simply discarded), so there is no
//! server-side session state.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by an issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the OAuth profile id
    pub sub: String,
    pub email: String,
    pub name: String,
    pub exp: usize,
}

pub fn create_token(
    secret: &str,
    ttl_hours: i64,
    sub: &str,
    email: &str,
    name: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours))
        .unwrap_or_else(chrono::Utc::now)
        .timestamp() as usize;

    let claims = Claims {
        sub: sub.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
