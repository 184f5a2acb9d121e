use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use sitesync_ledger::DeletionPlan;
use sitesync_protocol::{
    endpoints, Acknowledged, ApiError, DeletionPollResponse, HealthResponse, PollQuery, PollResponse,
    ReportDeletionRequest, ReportRequest,
};
use sitesync_registry::{
    AuditPage, AuditQuery, EntryPage, EntryView, ListQuery, NewWorkloadEntry, RegistryError, Site,
    SiteStatus, SiteSyncStatus,
};
use sitesync_types::{Actor, EntryId, SiteId};
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

/// TTL applied when a create request leaves it unset.
pub const DEFAULT_TTL_SECS: u32 = 3600;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

// Sites

#[derive(Debug, Default, Deserialize)]
pub struct SiteFilter {
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SiteList {
    pub sites: Vec<Site>,
}

pub async fn list_sites(
    State(state): State<AppState>,
    filter: Result<Query<SiteFilter>, QueryRejection>,
) -> ServerResult<Json<SiteList>> {
    let Query(filter) = filter.map_err(bad_query)?;
    let status = filter
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<SiteStatus>)
        .transpose()?;
    let sites = state.registry.sites().list(status)?;
    Ok(Json(SiteList { sites }))
}

pub async fn get_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Site>> {
    let id = SiteId::from(id);
    let site = state
        .registry
        .sites()
        .get(&id)?
        .ok_or(RegistryError::SiteNotFound(id))?;
    Ok(Json(site))
}

// Entries

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    #[serde(flatten)]
    pub entry: NewWorkloadEntry,
    #[serde(default)]
    pub site_ids: Vec<SiteId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignSitesRequest {
    pub site_ids: Vec<SiteId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SiteStatusList {
    pub site_statuses: Vec<SiteSyncStatus>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(flatten)]
    pub plan: DeletionPlan,
}

pub async fn list_entries(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ServerResult<Json<EntryPage>> {
    let Query(query) = query.map_err(bad_query)?;
    Ok(Json(state.registry.list(&query)?))
}

pub async fn create_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateEntryRequest>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<EntryView>)> {
    let Json(mut req) = body.map_err(bad_body)?;
    if req.entry.ttl == 0 {
        req.entry.ttl = DEFAULT_TTL_SECS;
    }
    let view = state
        .registry
        .create(&actor(&headers), req.entry, &req.site_ids)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<EntryView>> {
    Ok(Json(state.registry.get(&EntryId::from(id))?))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServerResult<Json<DeleteResponse>> {
    let plan = state
        .registry
        .delete(&actor(&headers), &EntryId::from(id))?;
    Ok(Json(DeleteResponse {
        success: true,
        plan,
    }))
}

pub async fn assign_sites(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<AssignSitesRequest>, JsonRejection>,
) -> ServerResult<Json<SiteStatusList>> {
    let Json(req) = body.map_err(bad_body)?;
    let site_statuses =
        state
            .registry
            .assign_to_sites(&actor(&headers), &EntryId::from(id), &req.site_ids)?;
    Ok(Json(SiteStatusList { site_statuses }))
}

pub async fn entry_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<SiteStatusList>> {
    let site_statuses = state.registry.sync_status(&EntryId::from(id))?;
    Ok(Json(SiteStatusList { site_statuses }))
}

pub async fn list_audit(
    State(state): State<AppState>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ServerResult<Json<AuditPage>> {
    let Query(query) = query.map_err(bad_query)?;
    Ok(Json(state.registry.audit().list(&query)?))
}

// Agent protocol

pub async fn agent_poll(
    State(state): State<AppState>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> ServerResult<Json<PollResponse>> {
    let query = poll_query(query)?;
    let entries = state.reconcile.poll_pending(&query)?;
    debug!(site_id = %query.site_id, count = entries.len(), "served poll");
    Ok(Json(PollResponse { entries }))
}

pub async fn agent_report(
    State(state): State<AppState>,
    body: Result<Json<ReportRequest>, JsonRejection>,
) -> ServerResult<Json<Acknowledged>> {
    let Json(report) = body.map_err(bad_body)?;
    Ok(Json(state.reconcile.record_report(report)?))
}

pub async fn agent_poll_deletions(
    State(state): State<AppState>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> ServerResult<Json<DeletionPollResponse>> {
    let query = poll_query(query)?;
    let entries = state.reconcile.poll_deleting(&query)?;
    debug!(site_id = %query.site_id, count = entries.len(), "served deletion poll");
    Ok(Json(DeletionPollResponse { entries }))
}

pub async fn agent_report_deletion(
    State(state): State<AppState>,
    body: Result<Json<ReportDeletionRequest>, JsonRejection>,
) -> ServerResult<Json<Acknowledged>> {
    let Json(report) = body.map_err(bad_body)?;
    Ok(Json(state.reconcile.record_deletion(report)?))
}

pub async fn fallback() -> ServerError {
    ServerError::Api(ApiError::not_found("no such route"))
}

/// Caller identity from the actor header, `anonymous` when absent or blank.
fn actor(headers: &HeaderMap) -> Actor {
    headers
        .get(endpoints::ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Actor::from)
        .unwrap_or_else(Actor::anonymous)
}

fn poll_query(query: Result<Query<PollQuery>, QueryRejection>) -> ServerResult<PollQuery> {
    let Query(query) = query.map_err(bad_query)?;
    if query.site_id.as_str().trim().is_empty() {
        return Err(ServerError::BadRequest("site_id is required".into()));
    }
    Ok(query)
}

fn bad_query(rejection: QueryRejection) -> ServerError {
    ServerError::BadRequest(rejection.body_text())
}

fn bad_body(rejection: JsonRejection) -> ServerError {
    ServerError::BadRequest(rejection.body_text())
}
