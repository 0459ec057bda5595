//! Statistics API server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use super::preload::PreloadCache;
use super::router::{AppState, create_router};
use super::source::{DataSource, FileDataSource};
use super::warmup::{WarmupReport, warm_up};
use crate::build_info::VersionInfo;
use crate::config::Config;
use crate::{Error, Result};

/// Statistics API server with a warmed preload cache
pub struct StatServer {
    config: Config,
    state: Arc<AppState>,
}

impl StatServer {
    /// Load the configured dataset and build the server
    pub async fn new(config: Config) -> Result<Self> {
        let source = FileDataSource::open(&config.dataset.path).await?;
        Ok(Self::with_source(config, Arc::new(source)))
    }

    /// Build the server over any data source
    pub fn with_source(config: Config, source: Arc<dyn DataSource>) -> Self {
        let state = Arc::new(AppState {
            preload: Arc::new(PreloadCache::new(config.preload.default_ttl)),
            source,
            preload_config: config.preload.clone(),
            version: VersionInfo::current(Utc::now()),
        });
        Self { config, state }
    }

    /// Warm the preload cache, unless disabled
    pub async fn warm_up(&self) -> Result<WarmupReport> {
        if !self.config.preload.enabled {
            info!("Preload disabled, serving read-through only");
            return Ok(WarmupReport::default());
        }
        warm_up(
            &self.state.preload,
            self.state.source.as_ref(),
            &self.config.preload,
        )
        .await
    }

    /// Router over this server's state
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Warm up, then serve until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        self.warm_up().await?;

        let listener = TcpListener::bind(addr).await?;
        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            build = %self.state.version.build_hash,
            "statcache v{} listening",
            env!("CARGO_PKG_VERSION")
        );

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
        let serve = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .into_future();
        let grace = self.config.server.shutdown_timeout;

        tokio::select! {
            result = serve => result.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                let _ = shutdown_rx.recv().await;
                tokio::time::sleep(grace).await;
            } => warn!(timeout = ?grace, "Graceful shutdown timed out"),
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
