//! Runtime configuration
//!
//! Everything is supplied through the environment; defaults target local
//! development. Secrets (JWT key, AI key, OAuth client secret) have empty
//! defaults on purpose.

use std::env;
use std::time::Duration;

/// Application configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address, e.g. `0.0.0.0:3001`
    pub bind_addr: String,
    /// HS256 signing key for issued bearer tokens
    pub jwt_secret: String,
    /// Token lifetime in hours
    pub jwt_ttl_hours: i64,
    /// OpenAI-compatible endpoint base, without trailing slash
    pub ai_base_url: String,
    /// Bearer key for the AI endpoint
    pub ai_api_key: String,
    /// Model name sent with completion requests
    pub ai_model: String,
    /// Caller-side timeout on AI requests
    pub ai_timeout: Duration,
    /// Google OAuth client credentials
    pub google_client_id: String,
    pub google_client_secret: String,
    /// Redirect URI registered with Google
    pub google_callback_url: String,
    /// Authorize endpoint; overridable so tests can point at a stub
    pub google_auth_url: String,
    /// Token exchange endpoint
    pub google_token_url: String,
    /// Userinfo endpoint
    pub google_userinfo_url: String,
    /// Admin UI origin, target of post-login redirects
    pub frontend_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".into(),
            jwt_secret: "dev-jwt-secret".into(),
            jwt_ttl_hours: 24,
            ai_base_url: "https://api.openai.com/v1".into(),
            ai_api_key: String::new(),
            ai_model: "gpt-4".into(),
            ai_timeout: Duration::from_secs(30),
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_callback_url: "http://localhost:3001/auth/google/callback".into(),
            google_auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            google_token_url: "https://oauth2.googleapis.com/token".into(),
            google_userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
            frontend_url: "http://localhost:3000".into(),
        }
    }
}

impl Config {
    /// Load from environment variables, falling back to dev defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
            jwt_secret: env_or("JWT_SECRET", &defaults.jwt_secret),
            jwt_ttl_hours: env_or("JWT_TTL_HOURS", "24").parse().unwrap_or(24),
            ai_base_url: env_or("AI_BASE_URL", &defaults.ai_base_url),
            ai_api_key: env_or("AI_API_KEY", ""),
            ai_model: env_or("AI_MODEL", &defaults.ai_model),
            ai_timeout: Duration::from_secs(
                env_or("AI_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            ),
            google_client_id: env_or("GOOGLE_CLIENT_ID", ""),
            google_client_secret: env_or("GOOGLE_CLIENT_SECRET", ""),
            google_callback_url: env_or("GOOGLE_CALLBACK_URL", &defaults.google_callback_url),
            google_auth_url: env_or("GOOGLE_AUTH_URL", &defaults.google_auth_url),
            google_token_url: env_or("GOOGLE_TOKEN_URL", &defaults.google_token_url),
            google_userinfo_url: env_or("GOOGLE_USERINFO_URL", &defaults.google_userinfo_url),
            frontend_url: env_or("FRONTEND_URL", &defaults.frontend_url),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
