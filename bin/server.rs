// Retail Analytics - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use retail_analytics::server::{router, AppState};
use retail_analytics::{logging, AppConfig, Store};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store = Store::open(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path.display()))?;
    info!(path = %config.database_path.display(), "database opened");

    let addr = config.bind_addr.clone();
    info!(
        max_upload_bytes = config.import.max_upload_bytes,
        max_rows = config.import.max_rows,
        duplicate_policy = ?config.import.duplicate_policy,
        product_delete = ?config.product_delete_policy,
        "configuration loaded"
    );

    let app = router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("server running on http://{}", addr);

    axum::serve(listener, app).await.context("server failed")?;

    Ok(())
}
