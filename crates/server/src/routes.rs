//! Route handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use replay_core::element::ElementKind;
use replay_core::store::{
    ElementKey, LocalState, ResolutionPayload, ResolutionStatus, ResolvedFrom, TrackedElement,
};
use replay_osm::Manifest;
use replay_pipeline::{resolution, Error, HttpPipeline};
use serde::{Deserialize, Serialize};

type AppState = Arc<HttpPipeline>;

/// Assemble the facade router.
pub fn router(pipeline: AppState) -> Router {
    Router::new()
        .route("/replay-tool", get(replay_tool))
        .route("/replay-tool/trigger", post(trigger))
        .route("/replay-tool/re-trigger", post(retrigger))
        .route("/replay-tool/reset", post(reset))
        .route("/replay-tool/push", post(push))
        .route("/conflicts", get(conflicts))
        .route("/conflicts/{kind}/{id}", get(conflict_detail))
        .route("/conflicts/{kind}/{id}/update", patch(update_element))
        .route("/conflicts/{kind}/{id}/resolve", patch(resolve_element))
        .route(
            "/conflicts/{kind}/{id}/resolve/{whose}",
            put(resolve_preset),
        )
        .route("/conflicts/{kind}/{id}/reset", put(reset_element))
        .route("/resolved", get(resolved))
        .route("/partially-resolved", get(partially_resolved))
        .route("/unresolved", get(unresolved))
        .route("/all-changes", get(all_changes))
        .with_state(pipeline)
}

// -- Error mapping -----------------------------------------------------------

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.not_found_key().is_some() => StatusCode::NOT_FOUND,
            Error::AlreadyTriggered | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Store(_) | Error::State(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

fn parse_key(kind: &str, id: i64) -> Result<ElementKey, ApiError> {
    ElementKind::parse(kind)
        .map(|kind| ElementKey::new(kind, id))
        .ok_or_else(|| ApiError(Error::Config(format!("unknown element kind {kind:?}"))))
}

// -- Status ------------------------------------------------------------------

#[derive(Serialize)]
struct AoiSummary {
    name: String,
    description: Option<String>,
    bbox: Option<[f64; 4]>,
}

#[derive(Serialize)]
struct StatusResponse {
    state: replay_core::ReplayState,
    is_current_state_complete: bool,
    has_errored: bool,
    error_details: Option<String>,
    elements_data: Option<replay_core::state::ElementsData>,
    aoi: AoiSummary,
}

async fn replay_tool(State(pipeline): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let status = pipeline.storage().load_status()?;
    let config = pipeline.config();
    let manifest = Manifest::load(&config.manifest_path()).ok();
    Ok(Json(StatusResponse {
        state: status.state,
        is_current_state_complete: status.is_current_state_complete,
        has_errored: status.has_errored,
        error_details: status.error_details,
        elements_data: status.elements_data,
        aoi: AoiSummary {
            name: config.aoi_name.clone(),
            description: manifest.as_ref().map(|m| m.description.clone()),
            bbox: manifest.map(|m| m.bbox),
        },
    }))
}

// -- Control -----------------------------------------------------------------

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

async fn trigger(State(pipeline): State<AppState>) -> Result<Json<Message>, ApiError> {
    if pipeline.storage().load_status()?.is_initiated() {
        return Err(ApiError(Error::AlreadyTriggered));
    }
    spawn_logged(async move { pipeline.trigger().await });
    Ok(Json(Message {
        message: "replay tool triggered",
    }))
}

async fn retrigger(State(pipeline): State<AppState>) -> Json<Message> {
    spawn_logged(async move { pipeline.retrigger().await });
    Json(Message {
        message: "replay tool re-triggered",
    })
}

async fn reset(State(pipeline): State<AppState>) -> Result<Json<Message>, ApiError> {
    pipeline.reset()?;
    Ok(Json(Message {
        message: "replay tool reset",
    }))
}

async fn push(State(pipeline): State<AppState>) -> Json<Message> {
    spawn_logged(async move { pipeline.push().await.map(|_| ()) });
    Json(Message {
        message: "push started",
    })
}

fn spawn_logged<F>(task: F)
where
    F: std::future::Future<Output = Result<(), Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background pipeline task failed");
        }
    });
}

// -- Conflict listings and resolution ----------------------------------------

#[derive(Serialize)]
struct MiniElement {
    kind: ElementKind,
    element_id: i64,
    local_state: LocalState,
    status: ResolutionStatus,
    referred_by: Option<ElementKey>,
}

impl From<&TrackedElement> for MiniElement {
    fn from(e: &TrackedElement) -> Self {
        Self {
            kind: e.kind,
            element_id: e.element_id,
            local_state: e.local_state,
            status: e.status,
            referred_by: e.referred_by,
        }
    }
}

async fn conflicts(
    State(pipeline): State<AppState>,
) -> Result<Json<Vec<MiniElement>>, ApiError> {
    let elements = resolution::conflicting(pipeline.storage().as_ref())?;
    Ok(Json(elements.iter().map(MiniElement::from).collect()))
}

async fn conflict_detail(
    State(pipeline): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<TrackedElement>, ApiError> {
    let key = parse_key(&kind, id)?;
    Ok(Json(resolution::element(
        pipeline.storage().as_ref(),
        key,
    )?))
}

async fn update_element(
    State(pipeline): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
    Json(payload): Json<ResolutionPayload>,
) -> Result<Json<TrackedElement>, ApiError> {
    let key = parse_key(&kind, id)?;
    Ok(Json(resolution::update_element(
        pipeline.storage().as_ref(),
        key,
        &payload,
    )?))
}

async fn resolve_element(
    State(pipeline): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
    Json(payload): Json<ResolutionPayload>,
) -> Result<Json<TrackedElement>, ApiError> {
    let key = parse_key(&kind, id)?;
    Ok(Json(resolution::resolve_element(
        pipeline.storage().as_ref(),
        key,
        &payload,
    )?))
}

async fn resolve_preset(
    State(pipeline): State<AppState>,
    Path((kind, id, whose)): Path<(String, i64, String)>,
) -> Result<Json<TrackedElement>, ApiError> {
    let key = parse_key(&kind, id)?;
    let from = match whose.as_str() {
        "theirs" => ResolvedFrom::Theirs,
        "ours" => ResolvedFrom::Ours,
        other => {
            return Err(ApiError(Error::Config(format!(
                "unknown resolution source {other:?}"
            ))))
        }
    };
    Ok(Json(resolution::resolve_preset(
        pipeline.storage().as_ref(),
        key,
        from,
    )?))
}

async fn reset_element(
    State(pipeline): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<TrackedElement>, ApiError> {
    let key = parse_key(&kind, id)?;
    Ok(Json(resolution::reset_element(
        pipeline.storage().as_ref(),
        key,
    )?))
}

// -- Read-only listings ------------------------------------------------------

async fn resolved(
    State(pipeline): State<AppState>,
) -> Result<Json<Vec<TrackedElement>>, ApiError> {
    Ok(Json(resolution::resolved(pipeline.storage().as_ref())?))
}

async fn partially_resolved(
    State(pipeline): State<AppState>,
) -> Result<Json<Vec<TrackedElement>>, ApiError> {
    Ok(Json(resolution::partially_resolved(
        pipeline.storage().as_ref(),
    )?))
}

async fn unresolved(
    State(pipeline): State<AppState>,
) -> Result<Json<Vec<TrackedElement>>, ApiError> {
    Ok(Json(resolution::conflicting(pipeline.storage().as_ref())?))
}

#[derive(Deserialize)]
struct AllChangesQuery {
    state: Option<String>,
}

async fn all_changes(
    State(pipeline): State<AppState>,
    Query(query): Query<AllChangesQuery>,
) -> Result<Json<Vec<TrackedElement>>, ApiError> {
    let without_conflicts = query.state.as_deref() == Some("no-conflicts");
    Ok(Json(resolution::all_changes(
        pipeline.storage().as_ref(),
        without_conflicts,
    )?))
}
