//! Domain types shared across the scanner.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CourtwatchError, Result};

/// Minutes in a day; the upper bound for any interval end.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Venue name -> booked intervals for one date.
pub type BookedMap = BTreeMap<String, Vec<TimeInterval>>;

/// Venue name -> free intervals for one date, chronological.
pub type FreeSlotMap = BTreeMap<String, Vec<TimeInterval>>;

// ─── Proxies ──────────────────────────────────────────────

/// A proxy address taken from the remote list (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyCandidate(String);

impl ProxyCandidate {
    /// Parse one line of a proxy list. Blank lines, comments and anything that
    /// is not `host:port` (optionally prefixed with a proxy scheme) yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let authority = match line.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                if !matches!(scheme.as_str(), "http" | "https" | "socks5" | "socks5h") {
                    return None;
                }
                rest
            }
            None => line,
        };

        let (host, port) = authority.rsplit_once(':')?;
        if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
            return None;
        }
        match port.parse::<u16>() {
            Ok(p) if p > 0 => Some(Self(line.to_string())),
            _ => None,
        }
    }

    /// The address as it appeared in the list.
    pub fn address(&self) -> &str {
        &self.0
    }

    /// URL usable with `reqwest::Proxy`; bare addresses are HTTP CONNECT proxies.
    pub fn proxy_url(&self) -> String {
        if self.0.contains("://") {
            self.0.clone()
        } else {
            format!("http://{}", self.0)
        }
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Time intervals ───────────────────────────────────────

/// Half-open `[start, end)` range in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: u16,
    pub end: u16,
}

impl TimeInterval {
    /// Build an interval, enforcing `start < end <= 1440`.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start >= end || end > MINUTES_PER_DAY {
            return Err(CourtwatchError::InvalidTime(format!(
                "interval {start}..{end} is empty or exceeds one day"
            )));
        }
        Ok(Self { start, end })
    }

    /// Build from two `HH:MM` clock strings.
    pub fn from_clock(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    /// Parse an `HH:MM-HH:MM` range.
    pub fn parse_range(range: &str) -> Result<Self> {
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| CourtwatchError::InvalidTime(format!("not a range: '{range}'")))?;
        Self::from_clock(start, end)
    }

    /// Hour of day the interval starts in.
    pub fn start_hour(&self) -> u8 {
        (self.start / 60) as u8
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end - self.start
    }

    /// Intersection with `window`, if any.
    pub fn clamp_to(&self, window: &TimeInterval) -> Option<TimeInterval> {
        let start = self.start.max(window.start);
        let end = self.end.min(window.end);
        (start < end).then_some(TimeInterval { start, end })
    }

    pub fn start_clock(&self) -> String {
        format_clock(self.start)
    }

    pub fn end_clock(&self) -> String {
        format_clock(self.end)
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_clock(), self.end_clock())
    }
}

/// Parse `HH:MM` into minutes since midnight. `24:00` is accepted as end of day.
pub fn parse_clock(clock: &str) -> Result<u16> {
    let clock = clock.trim();
    let invalid = || CourtwatchError::InvalidTime(format!("bad clock value: '{clock}'"));

    let (h, m) = clock.split_once(':').ok_or_else(invalid)?;
    let hours: u16 = h.trim().parse().map_err(|_| invalid())?;
    let minutes: u16 = m.trim().parse().map_err(|_| invalid())?;
    if minutes >= 60 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Render minutes since midnight as `HH:MM`.
pub fn format_clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

// ─── Booking results ──────────────────────────────────────

/// Normalized booking state of one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBookings {
    pub date: NaiveDate,
    /// Every venue the backend listed for the date, booked or not.
    pub venues: Vec<String>,
    /// Only venues with at least one booking appear here.
    pub booked: BookedMap,
}

impl DayBookings {
    /// Booked intervals of a venue; empty when it is fully free.
    pub fn booked_for(&self, venue: &str) -> &[TimeInterval] {
        self.booked.get(venue).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_parse() {
        assert_eq!(
            ProxyCandidate::parse("  34.215.74.117:1080 \r").map(|p| p.proxy_url()),
            Some("http://34.215.74.117:1080".to_string())
        );
        assert_eq!(
            ProxyCandidate::parse("socks5://10.0.0.1:1080").map(|p| p.proxy_url()),
            Some("socks5://10.0.0.1:1080".to_string())
        );
        assert!(ProxyCandidate::parse("").is_none());
        assert!(ProxyCandidate::parse("# comment").is_none());
        assert!(ProxyCandidate::parse("10.0.0.1").is_none());
        assert!(ProxyCandidate::parse("10.0.0.1:http").is_none());
        assert!(ProxyCandidate::parse("10.0.0.1:0").is_none());
        assert!(ProxyCandidate::parse("ftp://10.0.0.1:21").is_none());
    }

    #[test]
    fn test_interval_bounds() {
        assert!(TimeInterval::new(480, 1320).is_ok());
        assert!(TimeInterval::new(0, 1440).is_ok());
        assert!(TimeInterval::new(600, 600).is_err());
        assert!(TimeInterval::new(700, 600).is_err());
        assert!(TimeInterval::new(0, 1441).is_err());
    }

    #[test]
    fn test_parse_range() {
        let iv = TimeInterval::parse_range("18:00-19:30").unwrap();
        assert_eq!(iv, TimeInterval { start: 1080, end: 1170 });
        assert_eq!(iv.start_hour(), 18);
        assert_eq!(iv.to_string(), "18:00-19:30");
        assert_eq!(TimeInterval::parse_range("22:00-24:00").unwrap().end, MINUTES_PER_DAY);
        assert!(TimeInterval::parse_range("18:00").is_err());
        assert!(TimeInterval::parse_range("25:00-26:00").is_err());
        assert!(TimeInterval::parse_range("18:61-19:00").is_err());
    }

    #[test]
    fn test_clamp() {
        let window = TimeInterval::from_clock("08:00", "22:00").unwrap();
        let early = TimeInterval::from_clock("07:00", "09:00").unwrap();
        assert_eq!(early.clamp_to(&window), Some(TimeInterval { start: 480, end: 540 }));
        let late = TimeInterval::from_clock("22:00", "23:00").unwrap();
        assert_eq!(late.clamp_to(&window), None);
    }
}
