//! CRUD over collections, environments and requests.

use crate::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use resterx_common::ResterxError;
use resterx_storage::{Backend, Collection, Environment, Request};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomFilter {
    pub room_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFilter {
    pub collection_id: Option<String>,
}

type ApiResult<T> = Result<Json<T>, ResterxError>;

// --- Collections ---

pub async fn list_collections(
    State(state): State<AppState>,
    Query(filter): Query<RoomFilter>,
) -> ApiResult<Vec<Collection>> {
    let collections = match filter.room_id.as_deref() {
        Some(room_id) => state.storage.get_collections_by_room(room_id).await?,
        None => state.storage.get_all_collections().await?,
    };
    Ok(Json(collections))
}

pub async fn create_collection(
    State(state): State<AppState>,
    Json(collection): Json<Collection>,
) -> Result<(StatusCode, Json<Collection>), ResterxError> {
    let saved = state.storage.save_collection(collection).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Collection> {
    Ok(Json(state.storage.get_collection(&id).await?))
}

pub async fn update_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut collection): Json<Collection>,
) -> ApiResult<Collection> {
    collection.id = Some(id);
    Ok(Json(state.storage.save_collection(collection).await?))
}

pub async fn delete_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ResterxError> {
    state.storage.delete_collection(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Environments ---

pub async fn list_environments(
    State(state): State<AppState>,
    Query(filter): Query<RoomFilter>,
) -> ApiResult<Vec<Environment>> {
    let environments = match filter.room_id.as_deref() {
        Some(room_id) => state.storage.get_environments_by_room(room_id).await?,
        None => state.storage.get_all_environments().await?,
    };
    Ok(Json(environments))
}

pub async fn create_environment(
    State(state): State<AppState>,
    Json(environment): Json<Environment>,
) -> Result<(StatusCode, Json<Environment>), ResterxError> {
    let saved = state.storage.save_environment(environment).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_environment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Environment> {
    Ok(Json(state.storage.get_environment(&id).await?))
}

pub async fn update_environment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut environment): Json<Environment>,
) -> ApiResult<Environment> {
    environment.id = Some(id);
    Ok(Json(state.storage.save_environment(environment).await?))
}

pub async fn delete_environment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ResterxError> {
    state.storage.delete_environment(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Requests ---

pub async fn list_requests(
    State(state): State<AppState>,
    Query(filter): Query<CollectionFilter>,
) -> ApiResult<Vec<Request>> {
    let requests = match filter.collection_id.as_deref() {
        Some(collection_id) => state.storage.get_requests_by_collection(collection_id).await?,
        None => state.storage.get_all_requests().await?,
    };
    Ok(Json(requests))
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(request): Json<Request>,
) -> Result<(StatusCode, Json<Request>), ResterxError> {
    let saved = state.storage.save_request(request).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Request> {
    Ok(Json(state.storage.get_request(&id).await?))
}

pub async fn update_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut request): Json<Request>,
) -> ApiResult<Request> {
    request.id = Some(id);
    Ok(Json(state.storage.save_request(request).await?))
}

pub async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ResterxError> {
    state.storage.delete_request(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
