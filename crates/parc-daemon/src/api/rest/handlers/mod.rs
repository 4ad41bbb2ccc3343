//! API request handlers

mod flares;
mod health;
mod hypes;
mod preferences;

pub use flares::*;
pub use health::*;
pub use hypes::*;
pub use preferences::*;

use crate::error::ApiError;
use parc_types::FlareId;

fn parse_flare_id(raw: &str) -> Result<FlareId, ApiError> {
    raw.parse()
        .map_err(|e: parc_types::IdParseError| ApiError::BadRequest(e.to_string()))
}
