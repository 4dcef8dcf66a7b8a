//! Niles - conversational DevOps assistant
//!
//! Collects issue details over a multi-turn dialog, tracks the resulting
//! jobs, and pushes notifications back into stored conversations.

mod api;
mod bot;
mod config;
mod db;
mod dialog;
mod issue_flow;
mod issue_service;
mod notifier;
mod recognizer;
mod record_log;
mod state_store;
#[cfg(test)]
mod testing;
mod transport;

use api::{create_router, AppState};
use bot::NilesBot;
use config::{BotConfig, RecognizerConfig};
use db::Database;
use issue_service::WebhookIssueService;
use recognizer::{HttpRecognizer, KeywordRecognizer, Recognizer};
use state_store::DatabaseStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use transport::ConnectorClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "niles_bot=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration; anything missing aborts startup
    let config = BotConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    let store = Arc::new(DatabaseStore::new(db));

    let recognizer: Arc<dyn Recognizer> = match &config.recognizer {
        RecognizerConfig::Keywords => {
            tracing::info!("Using keyword recognizer");
            Arc::new(KeywordRecognizer::new()?)
        }
        RecognizerConfig::Http { endpoint, api_key } => {
            tracing::info!(endpoint = %endpoint, "Using HTTP recognizer");
            Arc::new(HttpRecognizer::new(endpoint.clone(), api_key.clone())?)
        }
    };

    let issues = Arc::new(WebhookIssueService::new(config.issue_webhook_url.clone())?);
    let resumer = Arc::new(ConnectorClient::new(config.connector_token.clone())?);

    let bot = NilesBot::new(store, recognizer, issues, resumer, config.bot_settings());
    let state = AppState::new(bot);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(bot_name = %config.bot_name, "Niles listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
