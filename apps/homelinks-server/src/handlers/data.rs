use crate::AppState;
use crate::error::AppError;
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use homelinks_store::{ADMIN_USER, EffectiveView, WritePatch};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
pub struct UserParams {
    pub user: Option<String>,
}

impl UserParams {
    fn user(self) -> Option<String> {
        self.user.filter(|u| !u.trim().is_empty())
    }
}

/// Merged settings and items for `?user=` (admin when absent).
pub async fn get_data(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<Json<EffectiveView>, AppError> {
    let user = params.user().unwrap_or_else(|| ADMIN_USER.to_string());

    let view = state.store.read_view(&user).await.map_err(AppError::load)?;
    Ok(Json(view))
}

pub async fn post_data(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let user = params
        .user()
        .ok_or_else(|| AppError::BadRequest("User must be specified for POST".into()))?;

    let patch = parse_patch(&body)?;
    tracing::debug!(
        "Write for '{}': items={} settings={}",
        user,
        patch.items.as_ref().map_or(0, Vec::len),
        patch.settings.as_ref().map_or(0, |s| s.len())
    );

    state.store.write(&user, patch).await.map_err(AppError::save)?;
    Ok(Json(json!({ "ok": true })))
}

fn parse_patch(body: &[u8]) -> Result<WritePatch, AppError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| AppError::BadRequest("invalid payload".into()))?;
    if !value.is_object() {
        return Err(AppError::BadRequest("invalid payload".into()));
    }
    serde_json::from_value(value).map_err(|e| AppError::BadRequest(format!("invalid payload: {}", e)))
}
