//! SOS preference handlers

use crate::api::rest::{identity::CallerIdentity, state::AppState};
use crate::error::ApiResult;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use parc_types::{PreferencesPatch, SosPreferences};

pub async fn get_preferences(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> ApiResult<Json<SosPreferences>> {
    let prefs = state.engine.preferences(&caller.user_id).await?;
    Ok(Json(prefs))
}

/// Patch the caller's preferences; omitted fields are unchanged
pub async fn update_preferences(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    payload: Result<Json<PreferencesPatch>, JsonRejection>,
) -> ApiResult<Json<SosPreferences>> {
    let Json(patch) = payload?;
    let prefs = state.engine.update_preferences(&caller.user_id, patch).await?;
    Ok(Json(prefs))
}
