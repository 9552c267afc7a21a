//! HTTP relay server — accept loop and graceful shutdown.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::routes::{build_router, AppState};
use crate::relay::Relay;
use crate::types::{Config, Result};
use crate::upstream::{HttpConnector, Upstream};

/// Relay server wrapping the downstream router.
#[derive(Debug)]
pub struct RelayServer {
    config: Config,
    state: AppState,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Server relaying to the HTTP backend named in `config`.
    pub fn new(config: Config) -> Result<Self> {
        let connector = HttpConnector::new(config.upstream.clone())?;
        Ok(Self::with_upstream(config, Arc::new(connector)))
    }

    /// Server relaying to an arbitrary upstream.
    pub fn with_upstream(config: Config, upstream: Arc<dyn Upstream>) -> Self {
        let cancel = CancellationToken::new();
        let relay = Relay::new(
            upstream,
            config.relay.clone(),
            config.upstream.connect_timeout,
        )
        .with_shutdown(cancel.child_token());
        let state = AppState {
            relay,
            upstream: Arc::new(config.upstream.clone()),
        };

        Self {
            config,
            state,
            cancel,
        }
    }

    /// Bind `server.listen_addr` and run until cancelled.
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.server.listen_addr).await?;
        self.serve_on(listener).await
    }

    /// Run on an already-bound listener until cancelled.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "Relay listening on {} (upstream={}, connect_timeout={:?})",
            listener.local_addr()?,
            self.config.upstream.stream_url(),
            self.config.upstream.connect_timeout,
        );

        let shutdown = self.cancel.clone();
        axum::serve(listener, build_router(self.state.clone()))
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("Relay server shutting down");
            })
            .await?;
        Ok(())
    }

    /// Request graceful shutdown. Open sessions end with a `Cancelled` error
    /// event so their connections can drain.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
