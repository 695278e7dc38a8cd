//! # Courtwatch Core
//!
//! Shared building blocks for the availability scanner:
//! - `types` — proxies, time intervals, booked/free slot maps
//! - `config` — TOML configuration with serde defaults
//! - `error` — the workspace-wide error type
//! - `traits` — seams to the external collaborators (proxy list, probe,
//!   booking backend, messaging gateway)
//! - `store` — key-value variable store used across cycles

pub mod config;
pub mod error;
pub mod store;
pub mod traits;
pub mod types;

pub use config::CourtwatchConfig;
pub use error::{CourtwatchError, Result};
pub use store::{MemoryVariableStore, VariableStore};
pub use types::{BookedMap, DayBookings, FreeSlotMap, ProxyCandidate, TimeInterval};
