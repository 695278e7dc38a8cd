//! # Courtwatch Scanner
//!
//! The scan pipeline: proxy list hygiene and verification, the legacy-TLS
//! booking transport, booking response parsing, free-slot computation,
//! day-of-week policy, notification dedup and the cycle orchestrator.

pub mod booking;
pub mod dedup;
pub mod policy;
pub mod proxy;
pub mod scan;
pub mod slots;
pub mod transport;

pub use booking::BookingClient;
pub use dedup::{DedupCache, DedupStore};
pub use policy::DayPolicy;
pub use proxy::{HttpProbe, HttpProxySource, ProxyVerifier};
pub use scan::{Collaborators, ScanOutcome, ScanReport, Scanner, render_notification};
pub use slots::{free_slot_map, free_slots};
pub use transport::{LegacyHttpTransport, LegacyTlsProfile};
