//! PARC daemon library
//!
//! This module provides the core components of the Peer-Assist Rescue Core:
//! - Rescue engine (flares, hype, resolve)
//! - Escalation sweeper
//! - Storage backends and collaborator adapters
//! - REST API handlers
//! - Server lifecycle management

pub mod api;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod rescue;
pub mod scheduler;
pub mod server;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DaemonConfig;
pub use error::{ApiError, CollaboratorError, DaemonError, RescueError, StorageError};
pub use rescue::{Caller, RaiseOutcome, RescueEngine};
pub use scheduler::{EscalationSweeper, SweepReport};
pub use server::Server;
pub use storage::{InMemorySosStore, PostgresSosStore, SosStore};
