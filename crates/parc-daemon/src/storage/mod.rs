//! Storage layer for parc-daemon
//!
//! The SOS Store owns flares, hypes, and per-user preferences and mediates
//! all concurrency between request handlers and the sweeper.

mod memory;
mod postgres;
mod traits;

pub use memory::InMemorySosStore;
pub use postgres::PostgresSosStore;
pub use traits::{FlareStorage, HypeStorage, PreferencesStorage, SosStore, StorageResult};
