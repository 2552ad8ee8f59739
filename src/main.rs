//! CRM API server entry point

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_api::config::Config;
use crm_api::{build_router, worker, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let addr = config.bind_addr.clone();

    let state = AppState::new(config);
    worker::spawn_all(&state);
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!("CRM API listening on {}", addr);

    if let Err(error) = axum::serve(listener, app).await {
        tracing::error!(%error, "server exited");
        std::process::exit(1);
    }
}
