//! Bearer-token authentication middleware
//!
//! Verifies the `Authorization: Bearer <jwt>` header and stashes the
//! verified claims in request extensions, where handlers pick them up
//! through `Extension<Claims>`. No server-side session state exists;
//! identity travels with each request.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth;
use crate::error::ApiError;
use crate::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    let claims = auth::verify_token(&state.config.jwt_secret, token)
        .map_err(|_| ApiError::Unauthorized)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
