//! Application state for API handlers

use crate::error::human_duration;
use crate::rescue::RescueEngine;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Rescue engine
    pub engine: Arc<RescueEngine>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(engine: Arc<RescueEngine>) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds().max(0) as u64;
        if secs < 86_400 {
            human_duration(secs)
        } else {
            format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
        }
    }
}
