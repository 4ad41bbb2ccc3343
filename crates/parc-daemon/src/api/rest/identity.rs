//! Caller identity injected by the upstream gateway

use crate::error::ApiError;
use crate::rescue::Caller;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use parc_types::UserId;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const DISPLAY_NAME_HEADER: &str = "x-display-name";

/// Authenticated caller; rejects with 401 when the user id header is missing
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let user_id = header(USER_ID_HEADER).ok_or(ApiError::Unauthenticated)?;
        let display_name = header(DISPLAY_NAME_HEADER);

        Ok(CallerIdentity(Caller::new(UserId::new(user_id), display_name)))
    }
}
