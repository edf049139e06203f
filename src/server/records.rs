use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::store::{AppConfig, Client, Dashboard, DataManager, Product, Record, Store};
use crate::verifactu::{ChainReport, RegistrationRecord};

/// A record type served under its own collection route.
pub trait Collection: Record + Send + Sync + 'static {
    fn manager(store: &Store) -> &DataManager<Self>;
}

impl Collection for Client {
    fn manager(store: &Store) -> &DataManager<Self> {
        &store.clients
    }
}

impl Collection for Product {
    fn manager(store: &Store) -> &DataManager<Self> {
        &store.products
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn list<T: Collection>(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<T>>, ApiError> {
    let store = state.store.lock().await;
    let records = match query.q.as_deref() {
        Some(q) => T::manager(&store).search(q)?,
        None => T::manager(&store).list()?,
    };
    Ok(Json(records))
}

pub async fn get<T: Collection>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<T>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(T::manager(&store).get(&id)?))
}

pub async fn create<T: Collection>(
    State(state): State<AppState>,
    Json(record): Json<T>,
) -> Result<(StatusCode, Json<T>), ApiError> {
    let store = state.store.lock().await;
    let created = T::manager(&store).create(record)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update<T: Collection>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(record): Json<T>,
) -> Result<Json<T>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(T::manager(&store).update(&id, record)?))
}

pub async fn delete<T: Collection>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.lock().await;
    T::manager(&store).delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_config(State(state): State<AppState>) -> Result<Json<AppConfig>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.config.load()?.public_view()))
}

pub async fn put_config(
    State(state): State<AppState>,
    Json(config): Json<AppConfig>,
) -> Result<Json<AppConfig>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.config.update(config)?.public_view()))
}

pub async fn audit_log(State(state): State<AppState>) -> Json<Vec<RegistrationRecord>> {
    let store = state.store.lock().await;
    Json(store.invoices.audit_log().entries().to_vec())
}

pub async fn verify_log(State(state): State<AppState>) -> Json<ChainReport> {
    let store = state.store.lock().await;
    Json(store.invoices.verify_log())
}

pub async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, ApiError> {
    let store = state.store.lock().await;
    Ok(Json(store.dashboard()?))
}
