use std::future::Future;
use std::sync::Arc;

use sitesync_ledger::SyncLedger;
use sitesync_reconcile::ReconciliationService;
use sitesync_registry::{
    InMemoryAuditLog, InMemoryEntryStore, InMemorySiteDirectory, Site, WorkloadRegistry,
};
use sitesync_types::{Clock, SystemClock};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::{build_router, AppState};

/// SiteSync registry server.
pub struct SiteSyncServer {
    config: ServerConfig,
    state: AppState,
}

impl SiteSyncServer {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the in-memory registry stack and register the configured sites.
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> ServerResult<Self> {
        config.validate()?;
        let sites = InMemorySiteDirectory::with_sites(config.sites.iter().map(Site::from))?;
        let registry = WorkloadRegistry::new(
            Arc::new(InMemoryEntryStore::new()),
            Arc::new(sites),
            SyncLedger::in_memory(clock.clone()),
            Arc::new(InMemoryAuditLog::new(clock.clone())),
            clock,
        );
        let reconcile = ReconciliationService::new(registry.clone(), config.reconcile_settings());
        Ok(Self {
            state: AppState::new(registry, reconcile),
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkloadRegistry {
        &self.state.registry
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until the process is killed.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        tracing::info!(
            addr = %listener.local_addr()?,
            sites = self.config.sites.len(),
            "SiteSync server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
