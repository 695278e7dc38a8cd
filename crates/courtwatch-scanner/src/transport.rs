//! HTTP transport toward the booking backend.
//!
//! The backend runs an outdated TLS stack that fails negotiation with the
//! default secure settings. `LegacyTlsProfile` names every relaxation in one
//! place. Its OpenSSL-level settings apply to every OpenSSL context in the
//! process, so only backend-bound clients (booking queries and liveness
//! probes) run on native-tls; every other HTTPS client uses rustls.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use courtwatch_core::config::BackendConfig;
use courtwatch_core::error::{CourtwatchError, Result};
use courtwatch_core::traits::{BookingTransport, RawResponse};
use courtwatch_core::types::ProxyCandidate;

/// TLS compatibility shim for the booking backend.
///
/// `native-tls` covers certificate, hostname and protocol-version settings.
/// The cipher security level and legacy renegotiation live below its API, so
/// they are rendered as an OpenSSL configuration file that the binary
/// installs through `OPENSSL_CONF` before any TLS context exists.
#[derive(Debug, Clone)]
pub struct LegacyTlsProfile {
    /// OpenSSL cipher string; `@SECLEVEL=1` admits the server's weak DH/RSA keys.
    pub cipher_list: String,
    /// Allow talking to servers without RFC 5746 secure renegotiation.
    pub legacy_renegotiation: bool,
    /// Skip certificate chain and hostname verification.
    pub accept_invalid_certs: bool,
    pub min_protocol: Option<native_tls::Protocol>,
}

impl Default for LegacyTlsProfile {
    fn default() -> Self {
        Self {
            cipher_list: "DEFAULT@SECLEVEL=1".into(),
            legacy_renegotiation: true,
            accept_invalid_certs: true,
            min_protocol: Some(native_tls::Protocol::Tlsv10),
        }
    }
}

impl LegacyTlsProfile {
    /// File name used by `write_openssl_conf`.
    pub const CONF_FILE: &'static str = "openssl-legacy.cnf";

    pub fn connector(&self) -> Result<native_tls::TlsConnector> {
        native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .danger_accept_invalid_hostnames(self.accept_invalid_certs)
            .min_protocol_version(self.min_protocol)
            .build()
            .map_err(|e| CourtwatchError::Transport(format!("TLS setup failed: {e}")))
    }

    /// OpenSSL configuration carrying the settings `native-tls` cannot express.
    pub fn openssl_conf(&self) -> String {
        let mut options = Vec::new();
        if self.legacy_renegotiation {
            options.push("UnsafeLegacyRenegotiation");
            options.push("UnsafeLegacyServerConnect");
        }

        let mut conf = String::from(
            "openssl_conf = openssl_init\n\n\
             [openssl_init]\n\
             ssl_conf = ssl_sect\n\n\
             [ssl_sect]\n\
             system_default = system_default_sect\n\n\
             [system_default_sect]\n",
        );
        conf.push_str(&format!("CipherString = {}\n", self.cipher_list));
        if let Some(protocol) = self.min_protocol {
            conf.push_str(&format!("MinProtocol = {}\n", openssl_protocol_name(protocol)));
        }
        if !options.is_empty() {
            conf.push_str(&format!("Options = {}\n", options.join(",")));
        }
        conf
    }

    /// Write the OpenSSL configuration into `dir` and return its path.
    pub fn write_openssl_conf(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::CONF_FILE);
        std::fs::write(&path, self.openssl_conf())?;
        Ok(path)
    }

    /// A client that reaches the backend through `proxy` with this profile.
    pub fn client_via(&self, proxy: &ProxyCandidate, timeout: Duration) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(proxy.proxy_url())
            .map_err(|e| CourtwatchError::Transport(format!("bad proxy {proxy}: {e}")))?;
        reqwest::Client::builder()
            .use_preconfigured_tls(self.connector()?)
            .proxy(proxy)
            .timeout(timeout)
            .build()
            .map_err(|e| CourtwatchError::Transport(format!("Client error: {e}")))
    }
}

fn openssl_protocol_name(protocol: native_tls::Protocol) -> &'static str {
    match protocol {
        native_tls::Protocol::Sslv3 => "SSLv3",
        native_tls::Protocol::Tlsv10 => "TLSv1",
        native_tls::Protocol::Tlsv11 => "TLSv1.1",
        native_tls::Protocol::Tlsv12 => "TLSv1.2",
        _ => "TLSv1.2",
    }
}

/// Posts the booking-data form for one date through one proxy.
pub struct LegacyHttpTransport {
    backend: BackendConfig,
    tls: LegacyTlsProfile,
}

impl LegacyHttpTransport {
    pub fn new(backend: BackendConfig, tls: LegacyTlsProfile) -> Self {
        Self { backend, tls }
    }

    fn form(&self, date: NaiveDate) -> [(&'static str, String); 3] {
        [
            ("VenueTypeID", self.backend.venue_type_id.clone()),
            ("VenueTypeDisplayName", String::new()),
            ("billDay", date.format("%Y-%m-%d").to_string()),
        ]
    }
}

#[async_trait]
impl BookingTransport for LegacyHttpTransport {
    async fn fetch_day(&self, proxy: &ProxyCandidate, date: NaiveDate) -> Result<RawResponse> {
        let timeout = Duration::from_secs(self.backend.query_timeout_secs);
        let client = self.tls.client_via(proxy, timeout)?;

        let mut request = client.post(self.backend.booking_url()).form(&self.form(date));
        for (key, value) in &self.backend.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if !self.backend.session_cookie.is_empty() {
            request = request.header(reqwest::header::COOKIE, self.backend.session_cookie.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| CourtwatchError::Transport(format!("{proxy}: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CourtwatchError::Transport(format!("{proxy}: read body failed: {e}")))?;

        tracing::debug!("📡 {date} via {proxy} → HTTP {status} ({} bytes)", body.len());
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openssl_conf_carries_legacy_settings() {
        let conf = LegacyTlsProfile::default().openssl_conf();
        assert!(conf.contains("CipherString = DEFAULT@SECLEVEL=1"));
        assert!(conf.contains("UnsafeLegacyServerConnect"));
        assert!(conf.contains("MinProtocol = TLSv1\n"));
        assert!(conf.starts_with("openssl_conf = openssl_init"));
    }

    #[test]
    fn test_renegotiation_can_be_disabled() {
        let profile = LegacyTlsProfile {
            legacy_renegotiation: false,
            ..LegacyTlsProfile::default()
        };
        assert!(!profile.openssl_conf().contains("Options"));
    }

    #[test]
    fn test_write_openssl_conf() {
        let dir = std::env::temp_dir().join("courtwatch-test-tls");
        let path = LegacyTlsProfile::default().write_openssl_conf(&dir).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, LegacyTlsProfile::default().openssl_conf());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_form_fields() {
        let transport = LegacyHttpTransport::new(BackendConfig::default(), LegacyTlsProfile::default());
        let form = transport.form(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(form[2], ("billDay", "2026-10-19".to_string()));
        assert_eq!(form[0].1, "d3bc78ba-0d9c-4996-9ac5-5a792324decb");
    }
}
