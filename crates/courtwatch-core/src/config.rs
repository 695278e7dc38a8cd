//! Courtwatch configuration system.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CourtwatchError, Result};
use crate::types::TimeInterval;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourtwatchConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl CourtwatchConfig {
    /// Load config from the default path (~/.courtwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CourtwatchError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CourtwatchError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scanner cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.scan.business_window.interval()?;
        self.policy.weekday.validate("policy.weekday")?;
        self.policy.weekend.validate("policy.weekend")?;
        if self.proxy.concurrency == 0 {
            return Err(CourtwatchError::Config("proxy.concurrency must be at least 1".into()));
        }
        if self.scan.cache_capacity == 0 {
            return Err(CourtwatchError::Config("scan.cache_capacity must be at least 1".into()));
        }
        if !(1..=MAX_HORIZON_DAYS).contains(&self.scan.horizon_days) {
            return Err(CourtwatchError::Config(format!(
                "scan.horizon_days must be 1..={MAX_HORIZON_DAYS}, got {}",
                self.scan.horizon_days
            )));
        }
        if !(-12..=14).contains(&self.scan.utc_offset_hours) {
            return Err(CourtwatchError::Config(format!(
                "scan.utc_offset_hours out of range: {}",
                self.scan.utc_offset_hours
            )));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Courtwatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".courtwatch")
    }
}

/// Expand `~` in configured paths.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Booking backend endpoint and the static client identity it expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_booking_path")]
    pub booking_path: String,
    #[serde(default = "default_venue_type_id")]
    pub venue_type_id: String,
    /// Headers sent with every booking query.
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    /// Session cookie captured from a logged-in client. Rotate here, not in code.
    #[serde(default)]
    pub session_cookie: String,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_base_url() -> String { "https://program.springcocoon.com".into() }
fn default_booking_path() -> String { "/szbay/api/services/app/VenueBill/GetVenueBillDataAsync".into() }
fn default_venue_type_id() -> String { "d3bc78ba-0d9c-4996-9ac5-5a792324decb".into() }
fn default_query_timeout() -> u64 { 15 }
fn default_headers() -> BTreeMap<String, String> {
    [
        ("Accept", "application/json, text/javascript, */*; q=0.01"),
        ("Accept-Language", "zh-CN,zh"),
        ("X-Requested-With", "XMLHttpRequest"),
        ("Origin", "https://program.springcocoon.com"),
        (
            "Referer",
            "https://program.springcocoon.com/szbay/AppVenue/VenueBill/VenueBill?VenueTypeID=d3bc78ba-0d9c-4996-9ac5-5a792324decb",
        ),
        ("sec-ch-ua", "\" Not A;Brand\";v=\"99\", \"Chromium\";v=\"98\""),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"macOS\""),
        ("Sec-Fetch-Site", "same-origin"),
        ("Sec-Fetch-Mode", "cors"),
        ("Sec-Fetch-Dest", "empty"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            booking_path: default_booking_path(),
            venue_type_id: default_venue_type_id(),
            headers: default_headers(),
            session_cookie: String::new(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn booking_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.booking_path.trim_start_matches('/')
        )
    }
}

/// Proxy list source and verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_list_url")]
    pub list_url: String,
    /// Proxy used to download the list itself (not for booking queries).
    #[serde(default)]
    pub egress_proxy: Option<String>,
    /// URL probed through each candidate; defaults to the backend base URL.
    #[serde(default)]
    pub probe_url: Option<String>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "bool_true")]
    pub shuffle: bool,
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,
}

fn default_list_url() -> String {
    "https://raw.githubusercontent.com/claude89757/free_https_proxies/main/https_proxies.txt".into()
}
fn default_probe_timeout() -> u64 { 10 }
fn default_concurrency() -> usize { 10 }
fn default_list_timeout() -> u64 { 30 }
fn bool_true() -> bool { true }

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            list_url: default_list_url(),
            egress_proxy: None,
            probe_url: None,
            probe_timeout_secs: default_probe_timeout(),
            concurrency: default_concurrency(),
            shuffle: true,
            list_timeout_secs: default_list_timeout(),
        }
    }
}

/// Scan horizon, business hours and notification identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Tag the dedup cache is stored under.
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Prepended to venue names in notifications.
    #[serde(default = "default_venue_prefix")]
    pub venue_prefix: String,
    #[serde(default = "default_horizon")]
    pub horizon_days: u32,
    #[serde(default)]
    pub business_window: BusinessWindow,
    /// Offset of the venue's local time from UTC; decides what "today" is.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    /// Pause between consecutive date queries.
    #[serde(default = "default_query_delay")]
    pub query_delay_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_subject() -> String { "深圳湾网球场".into() }
fn default_venue_prefix() -> String { "深圳湾".into() }
/// Longest scan horizon accepted from config or the command line.
pub const MAX_HORIZON_DAYS: u32 = 31;

fn default_horizon() -> u32 { 7 }
fn default_utc_offset() -> i32 { 8 }
fn default_query_delay() -> u64 { 1000 }
fn default_cache_capacity() -> usize { 10 }

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            venue_prefix: default_venue_prefix(),
            horizon_days: default_horizon(),
            business_window: BusinessWindow::default(),
            utc_offset_hours: default_utc_offset(),
            query_delay_ms: default_query_delay(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Business hours as clock strings; also the JSON shape of the
/// `BUSINESS_WINDOW` runtime variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessWindow {
    pub start_time: String,
    pub end_time: String,
}

impl Default for BusinessWindow {
    fn default() -> Self {
        Self {
            start_time: "08:00".into(),
            end_time: "22:00".into(),
        }
    }
}

impl BusinessWindow {
    pub fn interval(&self) -> Result<TimeInterval> {
        TimeInterval::from_clock(&self.start_time, &self.end_time)
    }
}

/// Inclusive range of start hours worth notifying about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub from: u8,
    pub to: u8,
}

impl HourRange {
    pub fn contains(&self, hour: u8) -> bool {
        self.from <= hour && hour <= self.to
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.from > self.to || self.to > 23 {
            return Err(CourtwatchError::Config(format!(
                "{name}: invalid hour range {}..={}",
                self.from, self.to
            )));
        }
        Ok(())
    }
}

/// Hours of interest by day type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_weekday_hours")]
    pub weekday: HourRange,
    #[serde(default = "default_weekend_hours")]
    pub weekend: HourRange,
}

fn default_weekday_hours() -> HourRange { HourRange { from: 18, to: 21 } }
fn default_weekend_hours() -> HourRange { HourRange { from: 15, to: 21 } }

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            weekday: default_weekday_hours(),
            weekend: default_weekend_hours(),
        }
    }
}

/// Messaging gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Gateway host; the `WCF_IP` variable overrides it at cycle start.
    #[serde(default)]
    pub gateway_address: String,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
    #[serde(default)]
    pub recipient: String,
    /// Members to mention, comma-separated.
    #[serde(default)]
    pub aters: String,
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
}

fn default_gateway_port() -> u16 { 9999 }
fn default_send_timeout() -> u64 { 10 }

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            gateway_address: String::new(),
            gateway_port: default_gateway_port(),
            recipient: String::new(),
            aters: String::new(),
            timeout_secs: default_send_timeout(),
        }
    }
}

/// Cadence of the `watch` driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_cron")]
    pub cron: String,
    /// Wall-clock limit for one cycle; overrunning cycles are dropped.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

fn default_cron() -> String { "*/10 * * * *".into() }
fn default_run_timeout() -> u64 { 180 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            run_timeout_secs: default_run_timeout(),
        }
    }
}

/// Variable store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.courtwatch/variables.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}
