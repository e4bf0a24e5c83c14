//! OCR Server
//!
//! Upload an image or PDF, get the recognized text back as JSON.

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocr_server::config::{Config, InputMode};
use ocr_server::ocr::factory_for;
use ocr_server::routes;
use ocr_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Starting OCR Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "OCR engine: {:?} (lang {}, orientation classification {})",
        config.engine.backend,
        config.engine.language,
        if config.engine.use_angle_cls { "on" } else { "off" }
    );
    match config.upload.max_bytes {
        Some(max) => tracing::info!("Upload policy: {:?}, max {} bytes", config.upload.policy, max),
        None => tracing::info!("Upload policy: {:?}, no size limit", config.upload.policy),
    }
    if config.pipeline.input_mode == InputMode::File {
        tracing::info!("Uploads are staged on disk before recognition");
    }

    let factory = factory_for(&config.engine);
    let app_state = AppState::new(config.clone(), factory);

    if config.engine.eager_init {
        if let Err(e) = app_state.ocr().warm_up().await {
            tracing::warn!("OCR engine not ready at startup: {}. /health will report it", e);
        }
    }

    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("OCR Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
