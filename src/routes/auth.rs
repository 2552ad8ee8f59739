//! Login endpoints
//!
//! Google OAuth is treated as a narrow external interface: redirect out
//! to the authorize endpoint, exchange the callback code for a profile,
//! mint a bearer token, and hand it to the frontend. The OAuth endpoints
//! themselves are configurable so tests can point them at a stub.

use axum::extract::{Extension, Query, State};
use axum::middleware::from_fn_with_state;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, Claims};
use crate::middleware::auth::require_auth;
use crate::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/google", get(google_login))
        .route("/google/callback", get(google_callback))
        .merge(
            Router::new()
                .route("/me", get(me))
                .route("/logout", post(logout))
                .layer(from_fn_with_state(state, require_auth)),
        )
}

async fn google_login(State(state): State<AppState>) -> Redirect {
    let config = &state.config;
    let url = reqwest::Url::parse_with_params(
        &config.google_auth_url,
        &[
            ("client_id", config.google_client_id.as_str()),
            ("redirect_uri", config.google_callback_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid profile email"),
        ],
    )
    .map(String::from)
    .unwrap_or_else(|_| config.google_auth_url.clone());
    Redirect::temporary(&url)
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum ExchangeError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

async fn google_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let frontend = &state.config.frontend_url;
    let Some(code) = params.code else {
        return Redirect::temporary(&format!("{frontend}/auth/error"));
    };

    match exchange_code(&state, &code).await {
        Ok(token) => Redirect::temporary(&format!("{frontend}/auth/callback?token={token}")),
        Err(error) => {
            tracing::error!(%error, "OAuth code exchange failed");
            Redirect::temporary(&format!("{frontend}/auth/error"))
        }
    }
}

/// Exchange an authorization code for a signed bearer token
async fn exchange_code(state: &AppState, code: &str) -> Result<String, ExchangeError> {
    let config = &state.config;
    let http = reqwest::Client::new();

    let token: TokenResponse = http
        .post(&config.google_token_url)
        .form(&[
            ("code", code),
            ("client_id", config.google_client_id.as_str()),
            ("client_secret", config.google_client_secret.as_str()),
            ("redirect_uri", config.google_callback_url.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let profile: Profile = http
        .get(&config.google_userinfo_url)
        .bearer_auth(&token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let jwt = auth::create_token(
        &config.jwt_secret,
        config.jwt_ttl_hours,
        &profile.sub,
        &profile.email,
        &profile.name,
    )?;
    Ok(jwt)
}

async fn me(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}

async fn logout() -> Json<serde_json::Value> {
    // Stateless JWT: the client discards the token.
    Json(json!({ "message": "Logged out successfully" }))
}
