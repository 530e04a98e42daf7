mod config;

use std::sync::Arc;

use tracing::{info, warn};

use chatline_api::AppStateInner;
use chatline_gateway::{ChannelManager, TokenVerifier};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatline_server=debug,chatline_gateway=debug,chatline_api=debug,chatline_db=info,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = Arc::new(chatline_db::Database::open(&config.db_path)?);

    // Presence is process-local, so nobody can be online before we start.
    let reset = db.reset_online_flags()?;
    if reset > 0 {
        warn!("Cleared stale online flag for {} user(s)", reset);
    }

    // Shared state
    let verifier = TokenVerifier::new(&config.jwt_secret, config.token_ttl);
    let manager = ChannelManager::new(verifier.clone(), db.clone(), db.clone());
    let state = Arc::new(AppStateInner {
        db,
        verifier,
        manager,
    });

    let app = chatline_api::router(state);

    info!("Chatline server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Chatline server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
