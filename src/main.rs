use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use scribe_core::{EnvValues, HistoryStore, LlamaServerLoader, ScribeConfig, ScribeSession};

/// Main entry point for the scribe service
///
/// Resolves configuration, opens the history store, starts loading the model in the background
/// and serves the REST API. Generation requests are refused with 503 until the model is ready.
///
/// # Environment Variables
/// - `SCRIBE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `SCRIBE_DB_PATH`: History database file (default: "scribe_history.db")
/// - `SCRIBE_MODEL_PATH`: Model file served by the inference server
/// - `SCRIBE_ENGINE_URL`: Inference server base URL (default: "http://127.0.0.1:8080")
/// - `SCRIBE_EXPORT_DIR`: Directory for PDF exports (default: "exports")
/// - `SCRIBE_LANGUAGE`: Target language for report text (default: "English")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the history database cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scribe_run=info".parse()?)
                .add_directive("scribe_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("SCRIBE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = ScribeConfig::from_env_values(EnvValues {
        db_path: std::env::var("SCRIBE_DB_PATH").ok(),
        model_path: std::env::var("SCRIBE_MODEL_PATH").ok(),
        engine_url: std::env::var("SCRIBE_ENGINE_URL").ok(),
        export_dir: std::env::var("SCRIBE_EXPORT_DIR").ok(),
        language: std::env::var("SCRIBE_LANGUAGE").ok(),
    })?;

    tracing::info!("++ Opening history at {}", cfg.db_path().display());
    let store = Arc::new(HistoryStore::open(cfg.db_path())?);

    let session = Arc::new(ScribeSession::new(store, cfg.target_language().clone()).await);
    tracing::info!(
        "++ Loading model {} via {}",
        cfg.engine().model_path.display(),
        cfg.engine().endpoint
    );
    session.start_engine_load(LlamaServerLoader, cfg.engine().clone());

    let app = router(AppState::new(session.clone()));

    tracing::info!("++ Starting scribe REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Shutting down");
    session.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
