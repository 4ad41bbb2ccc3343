//! External collaborators consumed by the rescue core
//!
//! Identity, fasting, tribes, push delivery, and the craving coach are owned
//! by other services; PARC only sees the traits defined here.

mod http;
mod memory;
mod postgres;
mod traits;

pub use http::{OpenAiCoach, WebhookPush};
pub use memory::{CannedCoach, Delivery, InMemoryDirectory, LogPush, RecordingPush};
pub use postgres::PgDirectory;
pub use traits::{
    with_deadline, ActiveFast, ActiveFastLookup, Collaborators, CollaboratorResult, CravingCoach,
    DisabledCoach, PushDelivery, TribeDirectory,
};
