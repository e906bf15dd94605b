use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::assignment::AssignmentError;
use super::domain::{ClientId, HazardId, RecomputeContext, SiteId, WorkerId};
use super::gaps::GapAnalysisError;
use super::scoring::ScoringError;
use super::service::ComplianceService;
use super::store::{ComplianceStore, StoreError};
use super::worker_ref::WorkerRef;

/// Body of a single-worker recompute request.
#[derive(Debug, Default, Deserialize)]
pub struct RecomputeWorkerRequest {
    #[serde(default)]
    pub worker: Option<WorkerRef>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub site_id: Option<SiteId>,
}

/// Router exposing the engines 1:1 behind the `{success, data | error}` envelope.
pub fn compliance_router<S>(service: Arc<ComplianceService<S>>) -> Router
where
    S: ComplianceStore + 'static,
{
    Router::new()
        .route("/api/v1/workers/recompute", post(recompute_worker_handler::<S>))
        .route("/api/v1/recompute", post(recompute_all_handler::<S>))
        .route(
            "/api/v1/hazards/:hazard_id/recompute",
            post(recompute_hazard_handler::<S>),
        )
        .route(
            "/api/v1/workers/:worker_id/gaps",
            get(worker_gaps_handler::<S>),
        )
        .route(
            "/api/v1/clients/:client_id/gaps",
            get(client_gaps_handler::<S>),
        )
        .route(
            "/api/v1/workers/:worker_id/score",
            get(worker_score_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn recompute_worker_handler<S>(
    State(service): State<Arc<ComplianceService<S>>>,
    axum::Json(request): axum::Json<RecomputeWorkerRequest>,
) -> Response
where
    S: ComplianceStore + 'static,
{
    let worker = request
        .worker
        .unwrap_or_else(|| WorkerRef::ById(WorkerId::from("")));
    let context = RecomputeContext {
        client_id: request.client_id,
        site_id: request.site_id,
    };

    match service.assignment().recompute_worker(&worker, &context) {
        Ok(outcome) => success(outcome),
        Err(error) => assignment_failure(error),
    }
}

pub(crate) async fn recompute_all_handler<S>(
    State(service): State<Arc<ComplianceService<S>>>,
) -> Response
where
    S: ComplianceStore + 'static,
{
    match service.assignment().recompute_all() {
        Ok(report) => success(report),
        Err(error) => assignment_failure(error),
    }
}

pub(crate) async fn recompute_hazard_handler<S>(
    State(service): State<Arc<ComplianceService<S>>>,
    Path(hazard_id): Path<String>,
) -> Response
where
    S: ComplianceStore + 'static,
{
    match service
        .assignment()
        .recompute_by_hazard(&HazardId(hazard_id))
    {
        Ok(report) => success(report),
        Err(error) => assignment_failure(error),
    }
}

pub(crate) async fn worker_gaps_handler<S>(
    State(service): State<Arc<ComplianceService<S>>>,
    Path(worker_id): Path<String>,
) -> Response
where
    S: ComplianceStore + 'static,
{
    match service.gaps().analyze_worker(&WorkerId(worker_id)) {
        Ok(analysis) => success(analysis),
        Err(error @ GapAnalysisError::WorkerNotFound(_)) => {
            failure(StatusCode::NOT_FOUND, error.to_string())
        }
        Err(GapAnalysisError::Store(error)) => store_failure(error),
    }
}

pub(crate) async fn client_gaps_handler<S>(
    State(service): State<Arc<ComplianceService<S>>>,
    Path(client_id): Path<String>,
) -> Response
where
    S: ComplianceStore + 'static,
{
    match service.gaps().analyze_client(&ClientId(client_id)) {
        Ok(analysis) => success(analysis),
        Err(GapAnalysisError::Store(error)) => store_failure(error),
        Err(error) => failure(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

pub(crate) async fn worker_score_handler<S>(
    State(service): State<Arc<ComplianceService<S>>>,
    Path(worker_id): Path<String>,
) -> Response
where
    S: ComplianceStore + 'static,
{
    match service.scoring().score_worker(&WorkerId(worker_id)) {
        Ok(score) => success(score),
        Err(error @ ScoringError::WorkerNotFound(_)) => {
            failure(StatusCode::NOT_FOUND, error.to_string())
        }
        Err(ScoringError::Store(error)) => store_failure(error),
    }
}

fn assignment_failure(error: AssignmentError) -> Response {
    match error {
        AssignmentError::MissingWorkerId => failure(StatusCode::BAD_REQUEST, error.to_string()),
        AssignmentError::Store(error) => store_failure(error),
    }
}

fn store_failure(error: StoreError) -> Response {
    failure(store_status(&error), error.to_string())
}

pub(crate) fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn success<T: Serialize>(data: T) -> Response {
    let payload = json!({
        "success": true,
        "data": data,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

fn failure(status: StatusCode, message: String) -> Response {
    let payload = json!({
        "success": false,
        "error": message,
    });
    (status, axum::Json(payload)).into_response()
}
