use std::sync::Arc;

use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use sitesync_protocol::endpoints;
use sitesync_reconcile::ReconciliationService;
use sitesync_registry::WorkloadRegistry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handler;

/// Shared handles every handler receives.
#[derive(Clone)]
pub struct AppState {
    pub registry: WorkloadRegistry,
    pub reconcile: Arc<ReconciliationService>,
}

impl AppState {
    pub fn new(registry: WorkloadRegistry, reconcile: ReconciliationService) -> Self {
        Self {
            registry,
            reconcile: Arc::new(reconcile),
        }
    }
}

/// Build the axum router with the registry and agent endpoints.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(endpoints::ACTOR_HEADER),
        ]);

    Router::new()
        .route(endpoints::HEALTH, get(handler::health))
        .route(endpoints::AGENT_POLL, get(handler::agent_poll))
        .route(endpoints::AGENT_REPORT, post(handler::agent_report))
        .route(
            endpoints::AGENT_POLL_DELETIONS,
            get(handler::agent_poll_deletions),
        )
        .route(
            endpoints::AGENT_REPORT_DELETION,
            post(handler::agent_report_deletion),
        )
        .route(endpoints::SITES, get(handler::list_sites))
        .route(endpoints::SITE, get(handler::get_site))
        .route(
            endpoints::ENTRIES,
            get(handler::list_entries).post(handler::create_entry),
        )
        .route(
            endpoints::ENTRY,
            get(handler::get_entry).delete(handler::delete_entry),
        )
        .route(endpoints::ENTRY_SITES, post(handler::assign_sites))
        .route(endpoints::ENTRY_STATUS, get(handler::entry_status))
        .route(endpoints::AUDIT, get(handler::list_audit))
        .fallback(handler::fallback)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
