//! # HTTP Surface
//!
//! Thin axum handlers over the [`Console`]. Every handler validates its
//! query, calls one console operation and maps the result.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use lib_axis::{Console, ListOptions, RecordKind, UserProfile};

use super::events;
use super::model::{ApiError, IdQuery, ModeQuery, ModeResponse, StatusQuery, StatusResponse};

/// Shared state of all routes.
pub struct AppState {
    pub console: Arc<Console>,
    /// Resolved once at startup; `None` when the identity lookup failed.
    pub user: Option<UserProfile>,
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health_handler))
        .route("/api/mode", get(mode_handler))
        .route("/api/status", get(status_handler))
        .route("/api/registry", get(registry_handler))
        .route("/api/events", get(events_handler))
        .route("/api/user", get(user_handler))
        .route("/api/notes", get(notes_handler))
        .route("/api/notes/detail", get(note_detail_handler))
        .route("/api/notes/delete", get(note_delete_handler).post(note_delete_handler))
        .route("/api/docs", get(doc_handler))
        .route("/api/docs/delete", get(doc_delete_handler).post(doc_delete_handler))
        .route("/api/sheets", get(sheet_handler))
        .route("/api/sheets/delete", get(sheet_delete_handler).post(sheet_delete_handler))
        .layer(cors)
        .with_state(state);

    match static_dir {
        Some(dir) if dir.is_dir() => api.fallback_service(ServeDir::new(dir)),
        Some(dir) => {
            tracing::warn!("Static directory {} not found. UI will not be served.", dir.display());
            api
        }
        None => api,
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

/// `GET /api/mode` reads, `GET /api/mode?set=AUTO|MANUAL` switches.
async fn mode_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModeQuery>,
) -> ApiResult<Json<ModeResponse>> {
    let mode = match query.set.filter(|s| !s.is_empty()) {
        Some(raw) => state.console.set_mode(&raw).await?,
        None => state.console.current_mode().await,
    };
    Ok(Json(ModeResponse { mode }))
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let (Some(id), Some(status)) = (
        query.id.filter(|s| !s.is_empty()),
        query.status.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::BadRequest("missing id or status".to_string()));
    };
    let status = state.console.set_status(&id, &status).await?;
    Ok(Json(StatusResponse { id, status }))
}

async fn registry_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let items = state.console.list_registry().await?;
    Ok(Json(items).into_response())
}

async fn events_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    events::registry_events(state.console.subscribe())
}

async fn user_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<UserProfile>> {
    state
        .user
        .clone()
        .map(Json)
        .ok_or_else(|| ApiError::Unavailable("user profile unavailable".to_string()))
}

async fn notes_handler(
    State(state): State<Arc<AppState>>,
    Query(opts): Query<ListOptions>,
) -> ApiResult<Response> {
    let page = state.console.list_notes(opts).await?;
    Ok(Json(page).into_response())
}

async fn fetch(state: &AppState, kind: RecordKind, query: IdQuery) -> ApiResult<Response> {
    let id = query.require()?;
    let record = state.console.fetch_record(kind, &id).await?;
    Ok(Json(record).into_response())
}

async fn delete(state: &AppState, kind: RecordKind, query: IdQuery) -> ApiResult<StatusCode> {
    let id = query.require()?;
    state.console.delete_record(kind, &id).await?;
    Ok(StatusCode::OK)
}

async fn note_detail_handler(State(state): State<Arc<AppState>>, Query(q): Query<IdQuery>) -> ApiResult<Response> {
    fetch(&state, RecordKind::Keep, q).await
}

async fn note_delete_handler(State(state): State<Arc<AppState>>, Query(q): Query<IdQuery>) -> ApiResult<StatusCode> {
    delete(&state, RecordKind::Keep, q).await
}

async fn doc_handler(State(state): State<Arc<AppState>>, Query(q): Query<IdQuery>) -> ApiResult<Response> {
    fetch(&state, RecordKind::Doc, q).await
}

async fn doc_delete_handler(State(state): State<Arc<AppState>>, Query(q): Query<IdQuery>) -> ApiResult<StatusCode> {
    delete(&state, RecordKind::Doc, q).await
}

async fn sheet_handler(State(state): State<Arc<AppState>>, Query(q): Query<IdQuery>) -> ApiResult<Response> {
    fetch(&state, RecordKind::Sheet, q).await
}

async fn sheet_delete_handler(State(state): State<Arc<AppState>>, Query(q): Query<IdQuery>) -> ApiResult<StatusCode> {
    delete(&state, RecordKind::Sheet, q).await
}
