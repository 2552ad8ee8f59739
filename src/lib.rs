//! CRM API Backend
//!
//! REST backend for customer engagement: customers and orders flow in
//! through an asynchronous mutation queue, segments select customers with
//! declarative rule trees, and campaigns track message delivery against a
//! segment.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         REST API                             │
//! │   JWT Bearer Auth | Google OAuth Login | JSON Validation     │
//! └──────┬──────────────────┬──────────────────┬─────────────────┘
//!        │                  │                  │
//!  ┌─────▼─────┐      ┌─────▼──────┐     ┌─────▼──────┐
//!  │ Mutation  │      │  Segment   │     │  Campaign  │
//!  │  Queue    │      │  Engine    │     │ Dispatcher │
//!  └─────┬─────┘      └─────┬──────┘     └─────┬──────┘
//!        │                  │                  │
//!  ┌─────▼──────────────────▼──────────────────▼─────┐
//!  │      Customer / Order / Segment / Campaign       │
//!  │                     Store                        │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! Customer and order writes are accepted with `202 Accepted` and applied
//! by background workers consuming the queue; segment and campaign writes
//! go to the store directly.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod segment;
pub mod services;
pub mod store;
pub mod worker;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::ai::AiClient;
use crate::services::cache::Cache;
use crate::services::queue::MemoryBroker;
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub queue: MemoryBroker,
    pub cache: Cache,
    pub ai: AiClient,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let ai = AiClient::new(&config);
        Self {
            config: Arc::new(config),
            store: Store::new(),
            queue: MemoryBroker::new(),
            cache: Cache::new(),
            ai,
        }
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/customers", routes::customers::router())
        .nest("/orders", routes::orders::router())
        .nest("/segments", routes::segments::router())
        .nest("/campaigns", routes::campaigns::router())
        .layer(from_fn_with_state(state.clone(), middleware::auth::require_auth));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .nest("/auth", routes::auth::router(state.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
