mod config;
mod error;
mod models;
mod routes;
mod services;
mod utils;

use axum::{
    response::{Html, Json},
    routing::get,
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::oauth_provider::{OAuthProviderConfig, OuraOAuthProvider};
use crate::services::{OAuthManager, SessionService, SleepService};

pub struct AppState {
    pub config: Config,
    // Session records for the browser, encrypted at rest
    pub sessions: Arc<SessionService>,
    // Authorization-code flow against the provider
    pub oauth_manager: Arc<OAuthManager>,
    // Sleep endpoint client and CSV export
    pub sleep_service: Arc<SleepService>,
}

impl AppState {
    pub fn new(config: Config) -> AppResult<Self> {
        // One client for both outbound calls, bounded so an unreachable
        // provider cannot hang a request
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let sessions = Arc::new(SessionService::new(
            &config.session_secret_key,
            config.session_ttl_secs,
        )?);

        let provider = Arc::new(OuraOAuthProvider::new(
            OAuthProviderConfig::oura(&config),
            http_client.clone(),
        ));
        let oauth_manager = Arc::new(OAuthManager::new(provider, sessions.clone()));
        let sleep_service = Arc::new(SleepService::new(&config, http_client));

        Ok(Self {
            config,
            sessions,
            oauth_manager,
            sleep_service,
        })
    }
}

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .merge(routes::oauth::create_routes())
        .merge(routes::sleep::create_routes())
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting sleep bridge");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: range {} to {}, output {}",
        config.start_date,
        config.end_date,
        config.output_path().display()
    );

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let state = Arc::new(AppState::new(config)?);
    let app = build_app(state);

    info!("Server running at http://{}", addr);
    info!("Open http://{}/login to authorize access to your sleep data", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}

async fn home() -> Html<&'static str> {
    Html("<h1>Welcome to your Oura app</h1><p><a href=\"/login\">Fetch your sleep data</a></p>")
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": true }))
}
