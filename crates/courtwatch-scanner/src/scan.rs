//! Scan orchestrator — one full cycle from proxy list to delivered messages.
//!
//! ```text
//! proxy list ─▶ verifier ─▶ for each date: query ─▶ free slots ─▶ day policy ─▶ render
//!                                                                                │
//!                            persist cache ◀── deliver new ◀── dedup filter ◀────┘
//! ```
//!
//! Dates run one after another; a failing date is logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, FixedOffset, NaiveDate, Utc, Weekday};
use courtwatch_core::config::{BusinessWindow, CourtwatchConfig, MAX_HORIZON_DAYS};
use courtwatch_core::error::{CourtwatchError, Result};
use courtwatch_core::store::{
    VAR_BUSINESS_WINDOW, VAR_GATEWAY_ADDRESS, VAR_PROXY_LIST_URL, VAR_PROXY_URL, VariableStore,
};
use courtwatch_core::traits::{BookingTransport, Messenger, ProxyProbe, ProxySource};
use courtwatch_core::types::TimeInterval;

use crate::booking::BookingClient;
use crate::dedup::DedupStore;
use crate::policy::DayPolicy;
use crate::proxy::{HttpProbe, HttpProxySource, ProxyVerifier};
use crate::slots::free_slot_map;
use crate::transport::{LegacyHttpTransport, LegacyTlsProfile};

/// Static settings of a scanner, taken from the config file.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub subject: String,
    pub venue_prefix: String,
    pub horizon_days: u32,
    pub window: TimeInterval,
    pub utc_offset: FixedOffset,
    pub query_delay: Duration,
    pub list_url: String,
    pub egress_proxy: Option<String>,
    pub gateway_address: String,
    pub recipient: String,
}

impl ScanSettings {
    pub fn from_config(config: &CourtwatchConfig) -> Result<Self> {
        let utc_offset = FixedOffset::east_opt(config.scan.utc_offset_hours * 3600).ok_or_else(|| {
            CourtwatchError::Config(format!("bad utc offset {}", config.scan.utc_offset_hours))
        })?;
        Ok(Self {
            subject: config.scan.subject.clone(),
            venue_prefix: config.scan.venue_prefix.clone(),
            horizon_days: config.scan.horizon_days,
            window: config.scan.business_window.interval()?,
            utc_offset,
            query_delay: Duration::from_millis(config.scan.query_delay_ms),
            list_url: config.proxy.list_url.clone(),
            egress_proxy: config.proxy.egress_proxy.clone(),
            gateway_address: config.messaging.gateway_address.clone(),
            recipient: config.messaging.recipient.clone(),
        })
    }
}

/// Settings for one cycle after runtime variables are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CycleSettings {
    list_url: String,
    egress_proxy: Option<String>,
    gateway_address: String,
    window: TimeInterval,
}

/// The external systems a scanner talks to.
pub struct Collaborators {
    pub source: Arc<dyn ProxySource>,
    pub probe: Arc<dyn ProxyProbe>,
    pub transport: Arc<dyn BookingTransport>,
    pub messenger: Arc<dyn Messenger>,
    pub store: Arc<dyn VariableStore>,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    /// No proxy passed verification; nothing was queried or sent.
    NoProxies,
}

/// Summary of one cycle.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    pub candidates: usize,
    pub verified: usize,
    pub scanned_dates: Vec<NaiveDate>,
    pub failed_dates: Vec<NaiveDate>,
    /// Every rendered notification, before dedup.
    pub notifications: Vec<String>,
    pub delivered: Vec<String>,
    pub undelivered: Vec<String>,
}

impl ScanReport {
    fn empty(outcome: ScanOutcome) -> Self {
        Self {
            outcome,
            candidates: 0,
            verified: 0,
            scanned_dates: Vec::new(),
            failed_dates: Vec::new(),
            notifications: Vec::new(),
            delivered: Vec::new(),
            undelivered: Vec::new(),
        }
    }
}

/// Runs scan cycles. Holds no state between cycles besides what the
/// variable store persists.
pub struct Scanner {
    settings: ScanSettings,
    shuffle: bool,
    source: Arc<dyn ProxySource>,
    verifier: ProxyVerifier,
    booking: BookingClient,
    policy: DayPolicy,
    messenger: Arc<dyn Messenger>,
    store: Arc<dyn VariableStore>,
    dedup: DedupStore,
}

impl Scanner {
    pub fn new(config: &CourtwatchConfig, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            source,
            probe,
            transport,
            messenger,
            store,
        } = collaborators;
        Ok(Self {
            settings: ScanSettings::from_config(config)?,
            shuffle: config.proxy.shuffle,
            source,
            verifier: ProxyVerifier::new(probe, config.proxy.concurrency),
            booking: BookingClient::new(transport, config.proxy.shuffle),
            policy: DayPolicy::from_config(&config.policy),
            messenger,
            dedup: DedupStore::new(store.clone(), config.scan.cache_capacity),
            store,
        })
    }

    /// Wire the HTTP collaborators: list download, probe and booking
    /// transport with the legacy TLS profile.
    pub fn with_http(
        config: &CourtwatchConfig,
        messenger: Arc<dyn Messenger>,
        store: Arc<dyn VariableStore>,
    ) -> Result<Self> {
        let tls = LegacyTlsProfile::default();
        let probe_url = config
            .proxy
            .probe_url
            .clone()
            .unwrap_or_else(|| config.backend.base_url.clone());
        let collaborators = Collaborators {
            source: Arc::new(HttpProxySource::new(Duration::from_secs(config.proxy.list_timeout_secs))),
            probe: Arc::new(HttpProbe::new(
                probe_url,
                Duration::from_secs(config.proxy.probe_timeout_secs),
                tls.clone(),
            )),
            transport: Arc::new(LegacyHttpTransport::new(config.backend.clone(), tls)),
            messenger,
            store,
        };
        Self::new(config, collaborators)
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Today in the venue's local time.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.settings.utc_offset).date_naive()
    }

    /// Run one cycle starting today.
    pub async fn run_cycle(&self, horizon_days: Option<u32>) -> Result<ScanReport> {
        self.run_cycle_from(self.today(), horizon_days).await
    }

    /// Run one cycle over `horizon_days` (or the configured horizon) dates
    /// starting at `first_date`.
    ///
    /// Errors only for cycle-fatal conditions: the proxy list cannot be
    /// fetched or the variable store fails.
    pub async fn run_cycle_from(&self, first_date: NaiveDate, horizon_days: Option<u32>) -> Result<ScanReport> {
        let started = std::time::Instant::now();
        let cycle = self.cycle_settings()?;
        let horizon = horizon_days
            .unwrap_or(self.settings.horizon_days)
            .min(MAX_HORIZON_DAYS);
        tracing::info!(
            "🎾 Scan '{}' starting: {horizon} days from {first_date}",
            self.settings.subject
        );

        let mut candidates = self
            .source
            .fetch(&cycle.list_url, cycle.egress_proxy.as_deref())
            .await?;
        if self.shuffle {
            use rand::seq::SliceRandom;
            candidates.shuffle(&mut rand::thread_rng());
        }
        let candidate_count = candidates.len();

        let verified = self.verifier.verify(candidates).await;
        if verified.is_empty() {
            tracing::warn!("⚠️ No usable proxies this cycle, skipping scan");
            let mut report = ScanReport::empty(ScanOutcome::NoProxies);
            report.candidates = candidate_count;
            return Ok(report);
        }

        let mut report = ScanReport::empty(ScanOutcome::Completed);
        report.candidates = candidate_count;
        report.verified = verified.len();

        for offset in 0..horizon {
            let Some(date) = first_date.checked_add_days(chrono::Days::new(u64::from(offset))) else {
                tracing::warn!("⚠️ Horizon runs past the calendar at offset {offset}, stopping");
                break;
            };
            if offset > 0 && !self.settings.query_delay.is_zero() {
                tokio::time::sleep(self.settings.query_delay).await;
            }

            match self.booking.query(date, &verified, &cycle.window).await {
                Ok(day) => {
                    let free = self.policy.apply(date, free_slot_map(&day, &cycle.window));
                    for (venue, slots) in &free {
                        for slot in slots {
                            report.notifications.push(render_notification(
                                &self.settings.venue_prefix,
                                venue,
                                date,
                                slot,
                            ));
                        }
                    }
                    report.scanned_dates.push(date);
                }
                Err(e) => {
                    if let CourtwatchError::QueryFailed {
                        last_response: Some(body),
                        ..
                    } = &e
                    {
                        tracing::debug!("{date}: last response: {}", truncate(body, 500));
                    }
                    tracing::warn!("⚠️ Skipping {date}: {e}");
                    report.failed_dates.push(date);
                }
            }
        }

        let cache = self.dedup.load(&self.settings.subject)?;
        let fresh = cache.filter_new(&report.notifications);
        tracing::info!(
            "📋 {} candidate notifications, {} new",
            report.notifications.len(),
            fresh.len()
        );

        for text in fresh {
            match self
                .messenger
                .send(&cycle.gateway_address, &text, &self.settings.recipient)
                .await
            {
                Ok(()) => {
                    tracing::info!("📣 Sent via {}: {text}", self.messenger.name());
                    report.delivered.push(text);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Delivery failed, will retry next cycle: {e}");
                    report.undelivered.push(text);
                }
            }
        }

        if !report.delivered.is_empty() {
            let cache = cache.with_delivered(&report.delivered);
            self.dedup.save(&self.settings.subject, &cache)?;
        }

        tracing::info!(
            "✅ Scan '{}' done in {:.1}s: {}/{} dates ok, {} sent, {} failed",
            self.settings.subject,
            started.elapsed().as_secs_f64(),
            report.scanned_dates.len(),
            horizon,
            report.delivered.len(),
            report.undelivered.len()
        );
        Ok(report)
    }

    /// Apply runtime variables on top of the static settings.
    fn cycle_settings(&self) -> Result<CycleSettings> {
        let store = self.store.as_ref();
        let list_url = store
            .get_string(VAR_PROXY_LIST_URL)?
            .unwrap_or_else(|| self.settings.list_url.clone());
        let egress_proxy = store
            .get_string(VAR_PROXY_URL)?
            .or_else(|| self.settings.egress_proxy.clone());
        let gateway_address = store
            .get_string(VAR_GATEWAY_ADDRESS)?
            .unwrap_or_else(|| self.settings.gateway_address.clone());

        let window = match store.get(VAR_BUSINESS_WINDOW)? {
            None | Some(serde_json::Value::Null) => self.settings.window,
            Some(value) => match serde_json::from_value::<BusinessWindow>(value)
                .map_err(CourtwatchError::from)
                .and_then(|w| w.interval())
            {
                Ok(window) => window,
                Err(e) => {
                    tracing::warn!("⚠️ Ignoring {VAR_BUSINESS_WINDOW}: {e}");
                    self.settings.window
                }
            },
        };

        Ok(CycleSettings {
            list_url,
            egress_proxy,
            gateway_address,
            window,
        })
    }
}

/// Chinese weekday name as used after `星期`.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "一",
        Weekday::Tue => "二",
        Weekday::Wed => "三",
        Weekday::Thu => "四",
        Weekday::Fri => "五",
        Weekday::Sat => "六",
        Weekday::Sun => "日",
    }
}

/// Render the notification text for one free slot. The text doubles as the
/// dedup key, so it must stay stable across cycles.
pub fn render_notification(prefix: &str, venue: &str, date: NaiveDate, slot: &TimeInterval) -> String {
    format!(
        "【{prefix}{venue}】星期{}({})空场: {}-{}",
        weekday_name(date.weekday()),
        date.format("%m-%d"),
        slot.start_clock(),
        slot.end_clock()
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courtwatch_core::store::MemoryVariableStore;
    use courtwatch_core::traits::RawResponse;
    use courtwatch_core::types::ProxyCandidate;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    // 2026-10-19 is a Monday
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    struct StaticSource(Vec<&'static str>);

    #[async_trait]
    impl ProxySource for StaticSource {
        async fn fetch(&self, _url: &str, _egress: Option<&str>) -> Result<Vec<ProxyCandidate>> {
            Ok(self.0.iter().filter_map(|a| ProxyCandidate::parse(a)).collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ProxySource for FailingSource {
        async fn fetch(&self, _url: &str, _egress: Option<&str>) -> Result<Vec<ProxyCandidate>> {
            Err(CourtwatchError::Http("proxy list fetch failed: HTTP 404".into()))
        }
    }

    /// Passes every proxy except those listed.
    struct AllowProbe(HashSet<&'static str>);

    #[async_trait]
    impl ProxyProbe for AllowProbe {
        async fn probe(&self, proxy: &ProxyCandidate) -> Result<()> {
            if self.0.contains(proxy.address()) {
                Err(CourtwatchError::Transport("timeout".into()))
            } else {
                Ok(())
            }
        }
    }

    /// One booking 18:00-19:00 on 1号场 every day; every proxy fails on `broken`.
    struct DayTransport {
        broken: Option<NaiveDate>,
    }

    #[async_trait]
    impl BookingTransport for DayTransport {
        async fn fetch_day(&self, proxy: &ProxyCandidate, date: NaiveDate) -> Result<RawResponse> {
            if Some(date) == self.broken {
                return Err(CourtwatchError::Transport(format!("{proxy}: connection reset")));
            }
            Ok(RawResponse::ok(
                json!({"result": [{
                    "listVenue": [{"id": "v-1", "displayName": "1号场"}],
                    "listWeixinVenueStatus": [
                        {"venueID": "v-1", "status": 20, "timeStartEndName": "18:00-19:00"},
                    ],
                }]})
                .to_string(),
            ))
        }
    }

    /// Records sends; fails for texts containing `reject`.
    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, String, String)>>,
        reject: Option<&'static str>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, gateway: &str, text: &str, recipient: &str) -> Result<()> {
            if self.reject.is_some_and(|r| text.contains(r)) {
                return Err(CourtwatchError::DeliveryFailed("gateway said no".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((gateway.into(), text.into(), recipient.into()));
            Ok(())
        }
    }

    fn config() -> CourtwatchConfig {
        let mut config = CourtwatchConfig::default();
        config.scan.query_delay_ms = 0;
        config.proxy.concurrency = 3;
        config.messaging.gateway_address = "10.0.0.9".into();
        config.messaging.recipient = "room@chatroom".into();
        config
    }

    struct Harness {
        scanner: Scanner,
        messenger: Arc<RecordingMessenger>,
        store: Arc<MemoryVariableStore>,
    }

    fn harness(broken: Option<NaiveDate>, messenger: RecordingMessenger) -> Harness {
        let messenger = Arc::new(messenger);
        let store = Arc::new(MemoryVariableStore::new());
        let scanner = Scanner::new(
            &config(),
            Collaborators {
                source: Arc::new(StaticSource(vec!["1.1.1.1:80", "2.2.2.2:80", "3.3.3.3:80", "4.4.4.4:80"])),
                probe: Arc::new(AllowProbe(HashSet::from(["4.4.4.4:80"]))),
                transport: Arc::new(DayTransport { broken }),
                messenger: messenger.clone(),
                store: store.clone(),
            },
        )
        .unwrap();
        Harness {
            scanner,
            messenger,
            store,
        }
    }

    #[tokio::test]
    async fn test_one_failed_date_does_not_stop_the_cycle() {
        let broken = monday() + chrono::Days::new(3);
        let h = harness(Some(broken), RecordingMessenger::default());

        let report = h.scanner.run_cycle_from(monday(), None).await.unwrap();

        assert_eq!(report.outcome, ScanOutcome::Completed);
        assert_eq!(report.candidates, 4);
        assert_eq!(report.verified, 3);
        assert_eq!(report.failed_dates, vec![broken]);
        assert_eq!(report.scanned_dates.len(), 6);
        // the 19:00-22:00 gap passes both the weekday and the weekend policy
        assert_eq!(report.notifications.len(), 6);
        assert_eq!(report.delivered.len(), 6);
        assert!(report.notifications.iter().all(|n| n.ends_with("空场: 19:00-22:00")));
        assert_eq!(report.notifications[0], "【深圳湾1号场】星期一(10-19)空场: 19:00-22:00");
        assert!(!report.notifications.iter().any(|n| n.contains("(10-22)")));

        let sent = h.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[0].0, "10.0.0.9");
        assert_eq!(sent[0].2, "room@chatroom");
    }

    #[tokio::test]
    async fn test_second_cycle_sends_nothing_new() {
        let h = harness(None, RecordingMessenger::default());
        let first = h.scanner.run_cycle_from(monday(), None).await.unwrap();
        assert_eq!(first.delivered.len(), 7);

        let second = h.scanner.run_cycle_from(monday(), None).await.unwrap();
        assert_eq!(second.notifications.len(), 7);
        assert!(second.delivered.is_empty());

        let store: Arc<dyn VariableStore> = h.store.clone();
        let cached: Vec<String> = store.get_as("深圳湾网球场").unwrap().unwrap();
        assert_eq!(cached, first.delivered);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_cached() {
        let messenger = RecordingMessenger {
            reject: Some("星期三"),
            ..Default::default()
        };
        let h = harness(None, messenger);
        let report = h.scanner.run_cycle_from(monday(), Some(3)).await.unwrap();
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.undelivered, vec!["【深圳湾1号场】星期三(10-21)空场: 19:00-22:00"]);

        let store: Arc<dyn VariableStore> = h.store.clone();
        let cached: Vec<String> = store.get_as("深圳湾网球场").unwrap().unwrap();
        assert_eq!(cached.len(), 2);
        assert!(!cached.contains(&report.undelivered[0]));
    }

    #[tokio::test]
    async fn test_no_proxies_ends_cleanly() {
        let store = Arc::new(MemoryVariableStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let scanner = Scanner::new(
            &config(),
            Collaborators {
                source: Arc::new(StaticSource(vec!["4.4.4.4:80"])),
                probe: Arc::new(AllowProbe(HashSet::from(["4.4.4.4:80"]))),
                transport: Arc::new(DayTransport { broken: None }),
                messenger: messenger.clone(),
                store: store.clone(),
            },
        )
        .unwrap();

        let report = scanner.run_cycle_from(monday(), None).await.unwrap();
        assert_eq!(report.outcome, ScanOutcome::NoProxies);
        assert!(report.scanned_dates.is_empty());
        assert!(messenger.sent.lock().unwrap().is_empty());
        assert!(store.get("深圳湾网球场").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_proxy_list_is_fatal() {
        let scanner = Scanner::new(
            &config(),
            Collaborators {
                source: Arc::new(FailingSource),
                probe: Arc::new(AllowProbe(HashSet::new())),
                transport: Arc::new(DayTransport { broken: None }),
                messenger: Arc::new(RecordingMessenger::default()),
                store: Arc::new(MemoryVariableStore::new()),
            },
        )
        .unwrap();
        assert!(scanner.run_cycle_from(monday(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_runtime_variables_override_config() {
        let h = harness(None, RecordingMessenger::default());
        h.store.set(VAR_GATEWAY_ADDRESS, &json!("192.168.1.20"), None).unwrap();
        h.store
            .set(VAR_BUSINESS_WINDOW, &json!({"start_time": "09:00", "end_time": "21:00"}), None)
            .unwrap();

        let report = h.scanner.run_cycle_from(monday(), Some(1)).await.unwrap();
        assert_eq!(report.notifications, vec!["【深圳湾1号场】星期一(10-19)空场: 19:00-21:00"]);
        assert_eq!(h.messenger.sent.lock().unwrap()[0].0, "192.168.1.20");
    }

    #[tokio::test]
    async fn test_bad_window_variable_falls_back() {
        let h = harness(None, RecordingMessenger::default());
        h.store
            .set(VAR_BUSINESS_WINDOW, &json!({"start_time": "late"}), None)
            .unwrap();
        let report = h.scanner.run_cycle_from(monday(), Some(1)).await.unwrap();
        assert_eq!(report.notifications, vec!["【深圳湾1号场】星期一(10-19)空场: 19:00-22:00"]);
    }

    #[tokio::test]
    async fn test_horizon_is_capped() {
        let h = harness(None, RecordingMessenger::default());
        let report = h.scanner.run_cycle_from(monday(), Some(u32::MAX)).await.unwrap();
        assert_eq!(report.scanned_dates.len(), MAX_HORIZON_DAYS as usize);

        let report = h.scanner.run_cycle_from(NaiveDate::MAX, Some(3)).await.unwrap();
        assert_eq!(report.scanned_dates, vec![NaiveDate::MAX]);
    }

    #[test]
    fn test_render_notification() {
        let slot = TimeInterval::from_clock("19:00", "20:00").unwrap();
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        assert_eq!(
            render_notification("深圳湾", "3号场", sunday, &slot),
            "【深圳湾3号场】星期日(10-25)空场: 19:00-20:00"
        );
    }
}
