//! # Courtwatch Scheduler
//! Runs scan cycles on a cron cadence and persists runtime variables.
//!
//! - `cron`: 5-field cron expressions
//! - `runner`: the watch loop; one cycle at a time, each under a deadline
//! - `variables`: SQLite-backed `VariableStore`

pub mod cron;
pub mod runner;
pub mod variables;

pub use cron::CronSchedule;
pub use runner::{RunOutcome, WatchRunner};
pub use variables::SqliteVariableStore;
