//! Proxy pool: list download, liveness probing, bounded-concurrency verification.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courtwatch_core::error::{CourtwatchError, Result};
use courtwatch_core::traits::{ProxyProbe, ProxySource};
use courtwatch_core::types::ProxyCandidate;
use futures::StreamExt;

use crate::transport::LegacyTlsProfile;

/// Parse a newline-delimited proxy list, dropping malformed lines and
/// repeats while keeping first-seen order.
pub fn parse_proxy_list(text: &str) -> Vec<ProxyCandidate> {
    let mut seen = HashSet::new();
    text.lines()
        .filter_map(ProxyCandidate::parse)
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Downloads the proxy list over plain HTTP(S).
pub struct HttpProxySource {
    timeout: Duration,
}

impl HttpProxySource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// rustls keeps this client out of reach of the process-wide OpenSSL
    /// settings installed for the booking backend.
    fn client(&self, egress_proxy: Option<&str>) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.timeout);
        if let Some(egress) = egress_proxy {
            let proxy = reqwest::Proxy::all(egress)
                .map_err(|e| CourtwatchError::Config(format!("bad egress proxy '{egress}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| CourtwatchError::Http(format!("Client error: {e}")))
    }
}

#[async_trait]
impl ProxySource for HttpProxySource {
    async fn fetch(&self, list_url: &str, egress_proxy: Option<&str>) -> Result<Vec<ProxyCandidate>> {
        let client = self.client(egress_proxy)?;
        let response = client
            .get(list_url)
            .send()
            .await
            .map_err(|e| CourtwatchError::Http(format!("proxy list fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CourtwatchError::Http(format!(
                "proxy list fetch failed: HTTP {}",
                response.status()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| CourtwatchError::Http(format!("proxy list read failed: {e}")))?;

        let candidates = parse_proxy_list(&text);
        tracing::info!("📥 Loaded {} proxy candidates from {list_url}", candidates.len());
        Ok(candidates)
    }
}

/// GETs the backend's base URL through a proxy with the legacy TLS profile.
pub struct HttpProbe {
    url: String,
    timeout: Duration,
    tls: LegacyTlsProfile,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration, tls: LegacyTlsProfile) -> Self {
        Self {
            url: url.into(),
            timeout,
            tls,
        }
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(&self, proxy: &ProxyCandidate) -> Result<()> {
        let client = self.tls.client_via(proxy, self.timeout)?;
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CourtwatchError::Transport(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CourtwatchError::Http(format!("probe answered {}", response.status())))
        }
    }
}

/// Probes candidates with at most `concurrency` probes in flight and
/// returns the ones that passed.
pub struct ProxyVerifier {
    probe: Arc<dyn ProxyProbe>,
    concurrency: usize,
}

impl ProxyVerifier {
    pub fn new(probe: Arc<dyn ProxyProbe>, concurrency: usize) -> Self {
        Self {
            probe,
            concurrency: concurrency.max(1),
        }
    }

    /// Returns once every probe has finished. Passing proxies come back in
    /// completion order; failures are logged and dropped.
    pub async fn verify(&self, candidates: Vec<ProxyCandidate>) -> Vec<ProxyCandidate> {
        let total = candidates.len();
        tracing::info!("🔍 Probing {total} proxies ({} at a time)", self.concurrency);

        let probe = &self.probe;
        let verified: Vec<ProxyCandidate> = futures::stream::iter(candidates)
            .map(|proxy| async move {
                match probe.probe(&proxy).await {
                    Ok(()) => {
                        tracing::debug!("✅ Proxy {proxy} usable");
                        Some(proxy)
                    }
                    Err(e) => {
                        tracing::debug!("Proxy {proxy} rejected: {e}");
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        tracing::info!("🔍 {}/{total} proxies passed the probe", verified.len());
        verified
    }
}
