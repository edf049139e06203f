use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use facturador::channels::HttpTransport;
use facturador::server::{AppState, build_router};
use facturador::store::Store;

// FACTURADOR_DATA_DIR  data directory (default ./data)
// FACTURADOR_ADDR      listen address (default 127.0.0.1:8080)
// RUST_LOG             log filter

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "facturador=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = std::env::var("FACTURADOR_DATA_DIR").unwrap_or_else(|_| "data".into());
    let addr = std::env::var("FACTURADOR_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());

    let store = Store::open(&data_dir)?;
    let report = store.invoices.verify_log();
    tracing::info!(
        data_dir = %data_dir,
        records = report.total,
        chain_valid = report.valid,
        "store opened"
    );

    let state = AppState::new(store, Arc::new(HttpTransport::new()?));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
