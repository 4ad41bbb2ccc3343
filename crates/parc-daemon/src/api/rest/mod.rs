//! REST API, nested under `/api/v1`

mod handlers;
mod identity;
mod router;
mod state;

pub use identity::CallerIdentity;
pub use router::create_router;
pub use state::AppState;
