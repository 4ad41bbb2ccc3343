//! Hype handlers

use super::parse_flare_id;
use crate::api::rest::{identity::CallerIdentity, state::AppState};
use crate::error::ApiResult;
use crate::rescue::QuotaStatus;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use parc_types::HypeResponse;
use serde::{Deserialize, Serialize};

/// Send hype request
#[derive(Debug, Deserialize)]
pub struct SendHypeRequest {
    pub emoji: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Send hype response
#[derive(Debug, Serialize)]
pub struct SendHypeResponse {
    pub hype: HypeResponse,
}

/// Send hype to a flare
pub async fn send_hype(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    payload: Result<Json<SendHypeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SendHypeResponse>)> {
    let flare_id = parse_flare_id(&id)?;
    let Json(request) = payload?;

    let hype = state
        .engine
        .send_hype(&flare_id, &caller, &request.emoji, request.message.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(SendHypeResponse { hype })))
}

/// List hypes on a flare, oldest first
pub async fn list_hypes(
    State(state): State<AppState>,
    CallerIdentity(_caller): CallerIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<HypeResponse>>> {
    let flare_id = parse_flare_id(&id)?;
    let hypes = state.engine.list_hypes(&flare_id).await?;
    Ok(Json(hypes))
}

/// Caller's remaining hype budget for a flare's tribe
pub async fn hype_quota(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<QuotaStatus>> {
    let flare_id = parse_flare_id(&id)?;
    let quota = state.engine.hype_quota(&caller.user_id, &flare_id).await?;
    Ok(Json(quota))
}
