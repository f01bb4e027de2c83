// SIPMS - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use sipms::api::{app, AppState};
use sipms::{open_database, SipmsConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SIPMS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = SipmsConfig::load().context("Failed to load configuration")?;

    let conn = open_database(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    tracing::info!(path = %config.database.path.display(), "database opened");

    let store = config.storage.document_store();
    std::fs::create_dir_all(store.media_root()).with_context(|| {
        format!("Failed to create media root {}", store.media_root().display())
    })?;

    let router = app(AppState::new(conn, store));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    tracing::info!(bind = %config.server.bind, version = sipms::VERSION, "SIPMS server running");
    println!("\n🚀 Server running on http://{}", config.server.bind);
    println!("   API: http://{}/api/health", config.server.bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}
