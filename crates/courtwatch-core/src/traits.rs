//! Seams to the external collaborators of a scan cycle.
//!
//! The scanner only talks to the outside world through these traits, so a
//! cycle can be driven end-to-end with in-process fakes.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::ProxyCandidate;

/// Where raw proxy candidates come from.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Download and parse the candidate list. `egress_proxy` routes the
    /// download itself through a fixed proxy.
    async fn fetch(&self, list_url: &str, egress_proxy: Option<&str>) -> Result<Vec<ProxyCandidate>>;
}

/// Liveness check for a single proxy.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// `Ok(())` when the target answered with a success status through `proxy`.
    async fn probe(&self, proxy: &ProxyCandidate) -> Result<()>;
}

/// Status and body of one backend exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// One booking-data request for one date through one proxy.
#[async_trait]
pub trait BookingTransport: Send + Sync {
    async fn fetch_day(&self, proxy: &ProxyCandidate, date: NaiveDate) -> Result<RawResponse>;
}

/// Outbound message delivery.
#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one text message. An `Err` means it was not delivered.
    async fn send(&self, gateway: &str, text: &str, recipient: &str) -> Result<()>;
}
