pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Semaphore, oneshot};
use tracing::{error, info};

use crate::core::lifecycle::LifecycleComponent;
use crate::core::orchestrator::BuildOrchestrator;

pub struct ApiServer {
    orchestrator: Arc<BuildOrchestrator>,
    bind_address: String,
    max_concurrent_requests: usize,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

pub struct ApiServerConfig {
    pub orchestrator: Arc<BuildOrchestrator>,
    pub bind_address: String,
    pub max_concurrent_requests: usize,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) orchestrator: Arc<BuildOrchestrator>,
    /// Bounds the number of builds running at once.
    pub(crate) build_permits: Arc<Semaphore>,
}

impl AppState {
    pub(crate) fn new(orchestrator: Arc<BuildOrchestrator>, max_concurrent_builds: usize) -> Self {
        Self {
            orchestrator,
            build_permits: Arc::new(Semaphore::new(max_concurrent_builds.max(1))),
        }
    }
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            orchestrator: config.orchestrator,
            bind_address: config.bind_address,
            max_concurrent_requests: config.max_concurrent_requests,
            shutdown_tx: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let state = AppState::new(self.orchestrator.clone(), self.max_concurrent_requests);
        let app = router::build_router(state);

        // Bind before spawning so a taken port fails startup.
        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .with_context(|| format!("failed to bind {}", self.bind_address))?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let addr = self.bind_address.clone();
        tokio::spawn(async move {
            info!("API Server running at http://{addr}");
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        Ok(())
    }
}
