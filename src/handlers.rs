use std::collections::HashSet;

use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::errors::WikiError;
use crate::types::{
    AppState, CreateItemRequest, DeleteItemRequest, ImportMarkdownRequest, MoveItemRequest,
    ReplaceStructureRequest, RestoreItemsRequest, UpdateFileRequest, UpdateSortOrderRequest,
};

/// Malformed bodies become a 400 with the usual `{ error }` shape
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, WikiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| WikiError::Validation(rejection.body_text()))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn file_structure(State(state): State<AppState>) -> Result<impl IntoResponse, WikiError> {
    Ok(Json(state.pages.list()?))
}

pub async fn replace_structure(
    State(state): State<AppState>,
    payload: Result<Json<ReplaceStructureRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    let count = state.pages.replace_structure(req.pages)?;
    Ok(Json(json!({ "success": true, "pages": count })))
}

pub async fn reorder(
    State(state): State<AppState>,
    payload: Result<Json<MoveItemRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    state.pages.move_item(&req)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn create_item(
    State(state): State<AppState>,
    payload: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    let node = state.pages.create(req)?;
    Ok(Json(node))
}

pub async fn delete_item(
    State(state): State<AppState>,
    payload: Result<Json<DeleteItemRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    state.pages.delete(&req.id, req.permanent)?;
    Ok(Json(json!({ "message": "Item deleted successfully" })))
}

pub async fn restore_items(
    State(state): State<AppState>,
    payload: Result<Json<RestoreItemsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    let report = state.pages.restore(&req.items, req.target.as_deref())?;
    Ok(Json(json!({
        "message": "Items restored successfully",
        "restored": report.restored,
        "skipped": report.skipped,
    })))
}

pub async fn update_sort_order(
    State(state): State<AppState>,
    payload: Result<Json<UpdateSortOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    state.pages.update_sort_order(&req)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn deleted_items(State(state): State<AppState>) -> Result<impl IntoResponse, WikiError> {
    let deleted = state.pages.deleted_items()?;
    Ok(Json(json!({ "deletedItems": deleted })))
}

pub async fn update_file(
    State(state): State<AppState>,
    payload: Result<Json<UpdateFileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    state.pages.update_file(&req)?;
    Ok(Json(json!({ "message": "File updated successfully" })))
}

pub async fn import_markdown(
    State(state): State<AppState>,
    payload: Result<Json<ImportMarkdownRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WikiError> {
    let req = body(payload)?;
    let node = state.pages.import_markdown(&req)?;
    Ok(Json(json!({ "success": true, "page": node })))
}

pub async fn get_page(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<impl IntoResponse, WikiError> {
    Ok(Json(state.pages.get_page(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    term: Option<String>,
}

/// Handle search requests
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, WikiError> {
    let term = params.term.unwrap_or_default();
    let term = term.trim();
    if term.is_empty() {
        return Err(WikiError::Validation("Missing search term".to_string()));
    }
    // Cap absurdly long queries on a char boundary
    let term: String = term.chars().take(1000).collect();

    let start_time = std::time::Instant::now();
    let trashed: HashSet<String> = state.pages.deleted_paths()?.into_iter().collect();
    let mut results = state.search.search(&term)?;
    results.retain(|r| !trashed.contains(&r.path));
    log::info!(
        "Search request for '{}' completed in {}ms",
        term,
        start_time.elapsed().as_millis()
    );
    Ok(Json(results))
}

pub async fn reindex(State(state): State<AppState>) -> Result<impl IntoResponse, WikiError> {
    let indexed = state.search.rebuild()?;
    Ok(Json(json!({ "success": true, "indexed": indexed })))
}
