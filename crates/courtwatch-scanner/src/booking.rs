//! Booking queries: failover across verified proxies and decoding of the
//! backend's booking-list payloads.
//!
//! The backend answers `{"result": [day]}` where `day` holds a venue
//! directory (`listVenue`) and one of two status lists:
//!
//! ```text
//! listWebVenueStatus     admin view   booked unless bookLinker is 可定/可订
//! listWeixinVenueStatus  public view  booked iff status == 20
//! ```
//!
//! Both lists carry `venueID` and a `timeStartEndName` of `HH:MM-HH:MM`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use courtwatch_core::error::{CourtwatchError, Result};
use courtwatch_core::traits::BookingTransport;
use courtwatch_core::types::{parse_clock, BookedMap, DayBookings, ProxyCandidate, TimeInterval};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::Value;

/// `bookLinker` values that mark a slot as still bookable.
const FREE_MARKERS: [&str; 2] = ["可定", "可订"];

/// `status` value of a booked slot in the public list.
const STATUS_BOOKED: i64 = 20;

#[derive(Debug, Deserialize)]
struct VenueEntry {
    id: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

/// Slot fields are loosely typed: free entries often carry nulls, and only
/// booked entries need a venue and a time range.
#[derive(Debug, Deserialize)]
struct AdminSlot {
    #[serde(rename = "bookLinker", default)]
    book_linker: Option<Value>,
    #[serde(rename = "timeStartEndName", default)]
    time_range: Option<Value>,
    #[serde(rename = "venueID", default)]
    venue_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PublicSlot {
    #[serde(default)]
    status: Option<Value>,
    #[serde(rename = "timeStartEndName", default)]
    time_range: Option<Value>,
    #[serde(rename = "venueID", default)]
    venue_id: Option<Value>,
}

/// A booked entry, shape-independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedSlot {
    pub venue_id: String,
    pub time_range: String,
}

impl BookedSlot {
    /// A booked entry must name its venue and time range as strings.
    fn from_fields(list: &str, venue_id: Option<Value>, time_range: Option<Value>) -> Result<Self> {
        let field = |value: Option<Value>, name: &str| match value {
            Some(Value::String(s)) => Ok(s),
            other => Err(CourtwatchError::ParseShape(format!(
                "{list}: booked entry has no usable {name}: {other:?}"
            ))),
        };
        Ok(Self {
            venue_id: field(venue_id, "venueID")?,
            time_range: field(time_range, "timeStartEndName")?,
        })
    }
}

/// Which status list the payload carried, reduced to its booked entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingShape {
    AdminList(Vec<BookedSlot>),
    PublicList(Vec<BookedSlot>),
    /// Neither list present or non-empty: nothing is booked.
    NoBookings,
}

impl BookingShape {
    /// Try the admin list first, then the public list.
    pub fn detect(day: &Value) -> Result<Self> {
        if let Some(slots) = parse_admin_list(day)? {
            return Ok(Self::AdminList(slots));
        }
        if let Some(slots) = parse_public_list(day)? {
            return Ok(Self::PublicList(slots));
        }
        Ok(Self::NoBookings)
    }

    pub fn booked_slots(&self) -> &[BookedSlot] {
        match self {
            Self::AdminList(slots) | Self::PublicList(slots) => slots,
            Self::NoBookings => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AdminList(_) => "admin",
            Self::PublicList(_) => "public",
            Self::NoBookings => "empty",
        }
    }
}

/// Non-empty array stored under `key`, if any.
fn non_empty_list<'a>(day: &'a Value, key: &str) -> Option<&'a Value> {
    day.get(key)
        .filter(|v| v.as_array().is_some_and(|a| !a.is_empty()))
}

/// `Ok(None)` when the admin list is absent or empty.
fn parse_admin_list(day: &Value) -> Result<Option<Vec<BookedSlot>>> {
    let Some(list) = non_empty_list(day, "listWebVenueStatus") else {
        return Ok(None);
    };
    let entries: Vec<AdminSlot> = serde_json::from_value(list.clone())
        .map_err(|e| CourtwatchError::ParseShape(format!("listWebVenueStatus: {e}")))?;
    let booked = entries
        .into_iter()
        .filter(|slot| !is_free_marker(slot.book_linker.as_ref()))
        .map(|slot| BookedSlot::from_fields("listWebVenueStatus", slot.venue_id, slot.time_range))
        .collect::<Result<_>>()?;
    Ok(Some(booked))
}

/// `Ok(None)` when the public list is absent or empty.
fn parse_public_list(day: &Value) -> Result<Option<Vec<BookedSlot>>> {
    let Some(list) = non_empty_list(day, "listWeixinVenueStatus") else {
        return Ok(None);
    };
    let entries: Vec<PublicSlot> = serde_json::from_value(list.clone())
        .map_err(|e| CourtwatchError::ParseShape(format!("listWeixinVenueStatus: {e}")))?;
    let booked = entries
        .into_iter()
        .filter(|slot| slot.status.as_ref().and_then(Value::as_i64) == Some(STATUS_BOOKED))
        .map(|slot| BookedSlot::from_fields("listWeixinVenueStatus", slot.venue_id, slot.time_range))
        .collect::<Result<_>>()?;
    Ok(Some(booked))
}

fn is_free_marker(marker: Option<&Value>) -> bool {
    matches!(marker, Some(Value::String(s)) if FREE_MARKERS.contains(&s.as_str()))
}

/// Parse a booked `HH:MM-HH:MM` range with half-hour marks floored to the
/// hour. `Ok(None)` when flooring leaves nothing (e.g. `18:00-18:30`).
pub fn normalize_range(range: &str) -> Result<Option<TimeInterval>> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| CourtwatchError::ParseShape(format!("bad time range '{range}'")))?;
    let floor_half = |clock: &str| -> Result<u16> {
        let minutes = parse_clock(clock)?;
        Ok(if minutes % 60 == 30 { minutes - 30 } else { minutes })
    };
    let (start, end) = (floor_half(start)?, floor_half(end)?);
    if start >= end {
        return Ok(None);
    }
    TimeInterval::new(start, end).map(Some)
}

/// Decode one booking response body for `date`. Bookings are clipped to
/// `window`; bookings entirely outside it are dropped.
pub fn parse_day(date: NaiveDate, body: &str, window: &TimeInterval) -> Result<DayBookings> {
    let envelope: Value = serde_json::from_str(body)
        .map_err(|e| CourtwatchError::ParseShape(format!("not JSON: {e}")))?;
    let results = envelope
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| CourtwatchError::ParseShape("missing 'result' array".into()))?;
    // More than one result has no known meaning; do not guess a merge.
    let [day] = results.as_slice() else {
        return Err(CourtwatchError::ParseShape(format!(
            "expected exactly one result, got {}",
            results.len()
        )));
    };

    let directory: Vec<VenueEntry> = match day.get("listVenue") {
        Some(Value::Null) | None => Vec::new(),
        Some(list) => serde_json::from_value(list.clone())
            .map_err(|e| CourtwatchError::ParseShape(format!("listVenue: {e}")))?,
    };
    let names: HashMap<&str, &str> = directory
        .iter()
        .map(|v| (v.id.as_str(), v.display_name.as_str()))
        .collect();

    let shape = BookingShape::detect(day)?;
    let mut booked = BookedMap::new();
    for slot in shape.booked_slots() {
        let venue = names.get(slot.venue_id.as_str()).ok_or_else(|| {
            CourtwatchError::ParseShape(format!("unknown venue id '{}'", slot.venue_id))
        })?;
        let Some(interval) = normalize_range(&slot.time_range)? else {
            tracing::debug!("Skipping sub-hour booking {} on {venue}", slot.time_range);
            continue;
        };
        let Some(interval) = interval.clamp_to(window) else {
            continue;
        };
        booked.entry(venue.to_string()).or_default().push(interval);
    }
    for intervals in booked.values_mut() {
        intervals.sort();
    }

    let mut venues: Vec<String> = Vec::with_capacity(directory.len());
    for entry in &directory {
        if !venues.contains(&entry.display_name) {
            venues.push(entry.display_name.clone());
        }
    }

    tracing::debug!(
        "🎾 {date}: {} shape, {} venues, {} booked",
        shape.name(),
        venues.len(),
        booked.len()
    );
    Ok(DayBookings {
        date,
        venues,
        booked,
    })
}

/// Queries one date, failing over across the verified proxies.
pub struct BookingClient {
    transport: Arc<dyn BookingTransport>,
    shuffle: bool,
}

impl BookingClient {
    pub fn new(transport: Arc<dyn BookingTransport>, shuffle: bool) -> Self {
        Self { transport, shuffle }
    }

    /// First proxy that yields HTTP 200 with a decodable single-result
    /// payload wins. When none does, `QueryFailed` carries the last body seen.
    pub async fn query(
        &self,
        date: NaiveDate,
        proxies: &[ProxyCandidate],
        window: &TimeInterval,
    ) -> Result<DayBookings> {
        let mut order: Vec<&ProxyCandidate> = proxies.iter().collect();
        if self.shuffle {
            order.shuffle(&mut rand::thread_rng());
        }

        let mut last_error = String::from("no verified proxies");
        let mut last_response = None;

        for (attempt, proxy) in order.iter().enumerate() {
            match self.transport.fetch_day(proxy, date).await {
                Ok(response) if response.status == 200 => {
                    match parse_day(date, &response.body, window) {
                        Ok(day) => {
                            if attempt > 0 {
                                tracing::info!("🔄 {date}: succeeded via {proxy} after {attempt} failed proxies");
                            }
                            return Ok(day);
                        }
                        Err(e) => {
                            tracing::warn!("⚠️ {date}: unusable payload via {proxy}: {e}");
                            last_error = e.to_string();
                            last_response = Some(response.body);
                        }
                    }
                }
                Ok(response) => {
                    tracing::warn!("⚠️ {date}: HTTP {} via {proxy}", response.status);
                    last_error = format!("HTTP {}", response.status);
                    last_response = Some(response.body);
                }
                Err(e) => {
                    tracing::warn!("⚠️ {date}: request via {proxy} failed: {e}");
                    last_error = e.to_string();
                }
            }
        }

        Err(CourtwatchError::QueryFailed {
            date,
            reason: format!("all {} proxies failed, last error: {last_error}", order.len()),
            last_response,
        })
    }
}
