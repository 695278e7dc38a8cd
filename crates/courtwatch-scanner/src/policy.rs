//! Day-of-week filter over computed free slots.

use chrono::{Datelike, NaiveDate, Weekday};
use courtwatch_core::config::{HourRange, PolicyConfig};
use courtwatch_core::types::FreeSlotMap;

/// Which start hours are worth a notification, by day type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPolicy {
    pub weekday: HourRange,
    pub weekend: HourRange,
}

impl DayPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            weekday: config.weekday,
            weekend: config.weekend,
        }
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn range_for(&self, date: NaiveDate) -> HourRange {
        if Self::is_weekend(date) {
            self.weekend
        } else {
            self.weekday
        }
    }

    /// Keep only slots starting inside the day's hour range. Venues left
    /// without slots are dropped.
    pub fn apply(&self, date: NaiveDate, slots: FreeSlotMap) -> FreeSlotMap {
        let range = self.range_for(date);
        slots
            .into_iter()
            .filter_map(|(venue, free)| {
                let kept: Vec<_> = free
                    .into_iter()
                    .filter(|iv| range.contains(iv.start_hour()))
                    .collect();
                (!kept.is_empty()).then_some((venue, kept))
            })
            .collect()
    }
}

impl Default for DayPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtwatch_core::types::TimeInterval;

    fn iv(start: &str, end: &str) -> TimeInterval {
        TimeInterval::from_clock(start, end).unwrap()
    }

    fn slots() -> FreeSlotMap {
        let mut map = FreeSlotMap::new();
        map.insert(
            "1号场".into(),
            vec![iv("08:00", "15:00"), iv("16:00", "18:00"), iv("19:00", "22:00")],
        );
        map.insert("2号场".into(), vec![iv("08:00", "12:00")]);
        map
    }

    #[test]
    fn test_weekday_keeps_evening_only() {
        // 2026-10-21 is a Wednesday
        let date = NaiveDate::from_ymd_opt(2026, 10, 21).unwrap();
        let out = DayPolicy::default().apply(date, slots());
        assert_eq!(out.len(), 1);
        assert_eq!(out["1号场"], vec![iv("19:00", "22:00")]);
    }

    #[test]
    fn test_weekend_keeps_afternoon_and_evening() {
        // 2026-10-24 is a Saturday
        let date = NaiveDate::from_ymd_opt(2026, 10, 24).unwrap();
        assert!(DayPolicy::is_weekend(date));
        let out = DayPolicy::default().apply(date, slots());
        assert_eq!(out["1号场"], vec![iv("16:00", "18:00"), iv("19:00", "22:00")]);
        assert!(!out.contains_key("2号场"));
    }

    #[test]
    fn test_custom_ranges() {
        let policy = DayPolicy {
            weekday: HourRange { from: 8, to: 8 },
            weekend: HourRange { from: 0, to: 23 },
        };
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let out = policy.apply(monday, slots());
        assert_eq!(out["1号场"], vec![iv("08:00", "15:00")]);
        assert_eq!(out["2号场"], vec![iv("08:00", "12:00")]);
    }
}
