use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, AppState};
use crate::core::FacturaError;
use crate::store::Session;

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

fn bearer(headers: &HeaderMap) -> Result<String, FacturaError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FacturaError::Auth("missing or invalid Authorization: Bearer <token>".into()))
}

/// Reject requests without a live session.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer(request.headers())?;
    state.store.lock().await.auth.validate(&token)?;
    Ok(next.run(request).await)
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state
        .store
        .lock()
        .await
        .auth
        .register(&body.username, &body.password)?;
    Ok((StatusCode::CREATED, Json(json!({ "username": body.username.trim() }))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .store
        .lock()
        .await
        .auth
        .login(&body.username, &body.password)?;
    Ok(Json(session))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let token = bearer(&headers)?;
    state.store.lock().await.auth.logout(&token);
    Ok(StatusCode::NO_CONTENT)
}
