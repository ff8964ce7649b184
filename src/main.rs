//! Tapline client: chat transports for the produce marketplace.
//!
//! Wires configuration, logging, the last-seen store, the REST client and
//! the websocket connector into a transport supervisor, opens the
//! configured conversations and logs every event until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use tapline_cache::LastSeenStoreManager;
use tapline_core::config::AppConfig;
use tapline_core::types::id::ConversationId;
use tapline_realtime::{HttpMessageApi, TransportEvent, TransportSupervisor, WsConnector};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %format!("{e:#}"), "Client error");
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> anyhow::Result<AppConfig> {
    let env = std::env::var("TAPLINE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env).with_context(|| format!("loading configuration for env '{env}'"))
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Tapline client v{}", env!("CARGO_PKG_VERSION"));

    let store = LastSeenStoreManager::new(&config.store)
        .await
        .context("opening last-seen store")?;
    let api = HttpMessageApi::new(&config.api, config.session.token.clone())
        .context("building messaging API client")?;
    let connector = WsConnector::new(config.realtime.url.clone());

    let supervisor = TransportSupervisor::from_config(
        &config,
        Arc::new(connector),
        Arc::new(api),
        store.shared(),
    );

    let poll_interval = config.polling.interval();
    supervisor.subscribe_all(move |event| match event {
        TransportEvent::NewMessage(message) => tracing::info!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            sender_role = %message.sender_role,
            content = %message.content,
            "New message"
        ),
        TransportEvent::StatusChanged { to, .. } => {
            tracing::info!(status = %to, "{}", to.describe(poll_interval))
        }
        other => tracing::debug!(kind = %other.kind(), event = ?other, "Transport event"),
    });

    for id in &config.session.conversations {
        supervisor.open_conversation(&ConversationId::new(id.clone()));
    }
    supervisor.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    tracing::info!("Shutting down");
    supervisor.stop();
    tracing::info!(metrics = ?supervisor.metrics(), "Final transport metrics");
    Ok(())
}
