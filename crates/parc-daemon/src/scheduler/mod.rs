//! Background scheduling

mod sweeper;

pub use sweeper::{EscalationSweeper, SweepReport};
