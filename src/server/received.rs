use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::store::{ReceivedInvoice, ReceivedState};

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub to: ReceivedState,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ReceivedInvoice>>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.received.list()?))
}

/// The body is the supplier's Facturae document, signed or not.
pub async fn import(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<ReceivedInvoice>), ApiError> {
    let store = state.store.lock().await;
    Ok((StatusCode::CREATED, Json(store.received.import(&body)?)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReceivedInvoice>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.received.get(&id)?))
}

pub async fn transition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<ReceivedInvoice>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.received.transition(&id, request.to, request.note)?))
}
