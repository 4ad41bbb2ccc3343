//! Flare handlers

use super::parse_flare_id;
use crate::api::rest::{identity::CallerIdentity, state::AppState};
use crate::error::ApiResult;
use crate::rescue::RaiseOutcome;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use parc_types::Flare;
use serde::{Deserialize, Serialize};

/// Raise flare request
#[derive(Debug, Deserialize)]
pub struct RaiseFlareRequest {
    #[serde(default)]
    pub description: String,
}

/// Resolve flare request
#[derive(Debug, Deserialize)]
pub struct ResolveFlareRequest {
    pub survived: bool,
}

/// Single flare envelope
#[derive(Debug, Serialize)]
pub struct FlareResponse {
    pub flare: Flare,
}

/// Caller's active flare, if any
#[derive(Debug, Serialize)]
pub struct ActiveFlareResponse {
    pub flare: Option<Flare>,
}

/// Raise a flare
pub async fn raise_flare(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    payload: Result<Json<RaiseFlareRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RaiseOutcome>)> {
    let Json(request) = payload?;
    let outcome = state.engine.raise_flare(&caller, &request.description).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Get the caller's ACTIVE flare
pub async fn active_flare(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> ApiResult<Json<ActiveFlareResponse>> {
    let flare = state.engine.active_flare(&caller.user_id).await?;
    Ok(Json(ActiveFlareResponse { flare }))
}

/// Get a flare by id
pub async fn get_flare(
    State(state): State<AppState>,
    CallerIdentity(_caller): CallerIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<FlareResponse>> {
    let flare_id = parse_flare_id(&id)?;
    let flare = state.engine.get_flare(&flare_id).await?;
    Ok(Json(FlareResponse { flare }))
}

/// Resolve a flare (owner only)
pub async fn resolve_flare(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
    payload: Result<Json<ResolveFlareRequest>, JsonRejection>,
) -> ApiResult<Json<FlareResponse>> {
    let flare_id = parse_flare_id(&id)?;
    let Json(request) = payload?;

    let flare = state
        .engine
        .resolve_flare(&flare_id, &caller.user_id, request.survived)
        .await?;
    Ok(Json(FlareResponse { flare }))
}
