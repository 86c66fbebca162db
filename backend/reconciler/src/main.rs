//! AI Studio reconciliation console — entry point.
//!
//! Holds the operator's view of the admin backend (webhook logs, users,
//! transactions) and exposes it as a small local JSON API. Every mutation is
//! forwarded to the backend and followed by a re-fetch; nothing here is
//! authoritative.

mod actions;
mod api;
mod client;
mod config;
mod console;
mod errors;
mod models;
mod search;
mod token;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client::HttpAdminClient;
use config::Config;
use console::ReconciliationConsole;
use token::TokenStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let tokens = TokenStore::new(config.token_file.clone());
    match tokens.load() {
        Ok(Some(_)) => info!("Using operator token from {}", tokens.path().display()),
        Ok(None) => warn!(
            "No operator token in {}; PUT /session before calling admin endpoints",
            tokens.path().display()
        ),
        Err(e) => warn!("Token file {} unreadable: {e}", tokens.path().display()),
    }

    let client = HttpAdminClient::new(&config.api_url, tokens.clone(), config.http_timeout)?;
    let console = ReconciliationConsole::new(client, config.page_size, config.search_debounce);

    // Warm the cache; an unreachable backend is not fatal.
    if let Err(e) = console.refresh_logs(None).await {
        warn!("Initial webhook log fetch failed: {e}");
    }

    let state = Arc::new(api::ApiState { console, tokens });
    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.console_port);
    info!("Console API listening on http://{addr} (backend {})", config.api_url);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
