//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order: store, client, admission,
//!   handler, HTTP state
//! - Start background tasks (store sweeper, metrics listener)
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last, so traffic only arrives once everything is ready
//! - On shutdown the server drains first, then background tasks stop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admission::Admission;
use crate::clock::SharedClock;
use crate::config::EdgeConfig;
use crate::http::{AcknowledgeHandler, AppState, EventHandler, EventPipeline, ForwardingHandler, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::resilience::{ClientError, ResilientClient, RetryOptions};
use crate::store::MemoryStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] ClientError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Fully wired subsystems, ready to serve.
pub struct Services {
    pub config: Arc<EdgeConfig>,
    pub store: MemoryStore,
    pub client: ResilientClient,
    pub state: AppState,
}

impl Services {
    pub fn build(config: EdgeConfig, clock: SharedClock) -> Result<Self, StartupError> {
        let config = Arc::new(config);
        let store = MemoryStore::new(clock.clone());
        let client = ResilientClient::from_config(
            config.retries.clone(),
            config.circuit_breaker.clone(),
            clock.clone(),
        )?;
        let admission = Admission::from_config(&config, Arc::new(store.clone()), clock);

        let handler: Arc<dyn EventHandler> = match &config.downstream.url {
            Some(url) => {
                let mut options = RetryOptions::new();
                if let Some(timeout_ms) = config.downstream.timeout_ms {
                    options = options.timeout_ms(timeout_ms);
                }
                tracing::info!(downstream = %url, "Forwarding events downstream");
                Arc::new(ForwardingHandler::new(client.clone(), url.clone(), options))
            }
            None => {
                tracing::info!("No downstream configured, acknowledging events only");
                Arc::new(AcknowledgeHandler)
            }
        };

        let budget =
            EventPipeline::budget_for(Duration::from_secs(config.listener.request_timeout_secs));
        let pipeline = EventPipeline::new(admission, handler, budget);
        let state = AppState::new(config.clone(), pipeline, client.clone());

        Ok(Self {
            config,
            store,
            client,
            state,
        })
    }

    pub fn server(&self) -> HttpServer {
        HttpServer::new(self.state.clone())
    }

    pub fn spawn_sweeper(&self, shutdown: &Shutdown) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.store.sweep_interval_secs);
        tokio::spawn(self.store.clone().run_sweeper(interval, shutdown.subscribe()))
    }
}

/// Start everything and serve until SIGINT/SIGTERM.
pub async fn run(config: EdgeConfig, clock: SharedClock) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = Services::build(config, clock)?;
    let shutdown = Arc::new(Shutdown::new());
    let sweeper = services.spawn_sweeper(&shutdown);
    let server_shutdown = shutdown.subscribe();

    let address = services.config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    let served = services.server().run(listener, server_shutdown).await;

    // Server errors also stop background tasks.
    shutdown.trigger();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Store sweeper task failed");
    }

    served.map_err(StartupError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_build_with_defaults() {
        let services = Services::build(EdgeConfig::default(), Arc::new(ManualClock::new(0))).unwrap();
        assert!(services.client.breakers().is_empty());
        assert!(services.store.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let services = Services::build(EdgeConfig::default(), Arc::new(ManualClock::new(0))).unwrap();
        let shutdown = Shutdown::new();
        let sweeper = services.spawn_sweeper(&shutdown);
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }
}
