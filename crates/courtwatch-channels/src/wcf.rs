//! WeChat gateway channel — plain-HTTP text messages via a WCF relay.
//!
//! The relay takes `POST http://{host}:{port}` with a JSON body
//! `{"msg", "receiver", "aters"}` and answers `{"status": 0, ...}` on success.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use courtwatch_core::config::MessagingConfig;
use courtwatch_core::error::{CourtwatchError, Result};
use courtwatch_core::traits::Messenger;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    msg: &'a str,
    receiver: &'a str,
    aters: &'a str,
}

/// Relay reply. Only `status` matters; 0 means delivered.
#[derive(Debug, Deserialize)]
pub struct WcfReply {
    pub status: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct WcfMessenger {
    client: reqwest::Client,
    port: u16,
    aters: String,
    timeout: Duration,
}

impl WcfMessenger {
    /// The client runs on rustls so an HTTPS relay is not exposed to the
    /// relaxed OpenSSL defaults the booking backend needs.
    pub fn new(config: &MessagingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| CourtwatchError::DeliveryFailed(format!("Client error: {e}")))?;
        Ok(Self {
            client,
            port: config.gateway_port,
            aters: config.aters.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Endpoint for a gateway host. An address that already carries a port
    /// or scheme is used as given; bare IPv6 addresses get brackets.
    pub fn endpoint(&self, gateway: &str) -> Result<String> {
        let gateway = gateway.trim().trim_end_matches('/');
        if gateway.is_empty() {
            return Err(CourtwatchError::DeliveryFailed(
                "no gateway address configured".into(),
            ));
        }
        if gateway.contains("://") {
            return Ok(gateway.to_string());
        }
        if let Ok(ip) = gateway.parse::<IpAddr>() {
            return Ok(format!("http://{}", SocketAddr::new(ip, self.port)));
        }
        if gateway.parse::<SocketAddr>().is_ok() {
            return Ok(format!("http://{gateway}"));
        }
        if gateway.starts_with('[') && gateway.ends_with(']') {
            return Ok(format!("http://{gateway}:{}", self.port));
        }
        match gateway.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
                Ok(format!("http://{gateway}"))
            }
            Some(_) => Err(CourtwatchError::DeliveryFailed(format!(
                "unusable gateway address '{gateway}'"
            ))),
            None => Ok(format!("http://{gateway}:{}", self.port)),
        }
    }
}

/// Interpret a relay reply body.
pub fn check_reply(body: &str) -> Result<()> {
    let reply: WcfReply = serde_json::from_str(body).map_err(|e| {
        CourtwatchError::DeliveryFailed(format!("unreadable gateway reply ({e}): {body}"))
    })?;
    match reply.status {
        Some(0) => Ok(()),
        status => Err(CourtwatchError::DeliveryFailed(format!(
            "gateway status {}: {}",
            status.map_or_else(|| "missing".to_string(), |s| s.to_string()),
            reply.message.unwrap_or_default()
        ))),
    }
}

#[async_trait]
impl Messenger for WcfMessenger {
    fn name(&self) -> &str {
        "wcf"
    }

    async fn send(&self, gateway: &str, text: &str, recipient: &str) -> Result<()> {
        let url = self.endpoint(gateway)?;
        let body = SendTextRequest {
            msg: text,
            receiver: recipient,
            aters: &self.aters,
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CourtwatchError::DeliveryFailed(format!("POST {url} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CourtwatchError::DeliveryFailed(format!("reading reply failed: {e}")))?;
        if !status.is_success() {
            return Err(CourtwatchError::DeliveryFailed(format!(
                "gateway HTTP {status}: {text}"
            )));
        }
        check_reply(&text)?;
        tracing::debug!("WCF delivered to {recipient}");
        Ok(())
    }
}
