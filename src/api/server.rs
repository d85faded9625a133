use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{info, warn};

use super::{
    services::{
        batch_download, clear_history, delete_download, delete_history, get_progress, health,
        list_downloads, list_history, media_info, not_found, playlist_download, progress_stream,
        redownload, retry_download, start_download, supported_sites,
    },
    state::AppState,
};
use crate::config::Config;
use crate::engine::YtDlpEngine;
use crate::ledger::HistoryStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/download", post(start_download))
        .route("/api/batch-download", post(batch_download))
        .route("/api/playlist-download", post(playlist_download))
        .route("/api/info", post(media_info))
        .route("/api/progress/{id}", get(get_progress))
        .route("/api/progress/stream/{id}", get(progress_stream))
        .route("/api/retry/{id}", post(retry_download))
        .route("/api/history", get(list_history))
        .route("/api/history/clear", delete(clear_history))
        .route("/api/history/{id}", delete(delete_history))
        .route("/api/history/redownload/{id}", post(redownload))
        .route("/api/downloads", get(list_downloads))
        .route("/api/delete/{filename}", delete(delete_download))
        .route("/api/supported-sites", get(supported_sites))
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
        // gzip/deflate request bodies are decompressed before handlers see them
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    tokio::fs::create_dir_all(&config.downloads.dir)
        .await
        .map_err(|e| format!("Failed to create download dir: {e}"))?;

    info!(path = %config.history.path.display(), "Opening history store");
    let history = HistoryStore::open(&config.history.path)
        .map_err(|e| format!("Failed to open history store: {e}"))?;

    let engine = Arc::new(YtDlpEngine::new(&config.engine));
    let address = config.server.bind_addr;
    let state = AppState::new(config, engine, history);
    let app = router(state.clone());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "mediafetch API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let active = state.registry.active_count();
    if active > 0 {
        warn!(active, "Shutting down with jobs still running");
    }
    state
        .history
        .persist()
        .map_err(|e| format!("Failed to flush history store: {e}"))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
