//! Rescue core: flare lifecycle, hype, and the policies around them
//!
//! - [`CooldownGate`] limits how often a user may raise a flare
//! - [`HypeQuota`] caps daily hype per sender by tribe size
//! - [`MessageComposer`] owns every user-facing notification text
//! - [`FanoutDispatcher`] alerts a tribe about a new flare
//! - [`RescueEngine`] ties them together behind the public operations

mod background;
mod compose;
mod cooldown;
mod engine;
mod fanout;
mod quota;

pub use background::BackgroundTasks;
pub use compose::MessageComposer;
pub use cooldown::{CooldownDecision, CooldownGate};
pub use engine::{Caller, RaiseOutcome, RescueEngine};
pub use fanout::{FanoutDispatcher, FanoutReport};
pub use quota::{HypeQuota, QuotaStatus};
