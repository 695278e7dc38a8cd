//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Field syntax: *, */N, N, A-B, A-B/N and comma lists of those.
//! Example: "*/10 * * * *" = every ten minutes

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use courtwatch_core::error::{CourtwatchError, Result};

/// A parsed cron expression. Each field holds the sorted matching values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    /// 0 = Sunday. 7 is accepted on input and folded to 0.
    days_of_week: Vec<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CourtwatchError::Config(format!(
                "invalid cron expression '{expression}' (need 5 fields: MIN HOUR DOM MON DOW)"
            )));
        }

        let mut days_of_week = parse_field(parts[4], 0, 7)?;
        if days_of_week.contains(&7) {
            days_of_week.retain(|d| *d != 7);
            if !days_of_week.contains(&0) {
                days_of_week.insert(0, 0);
            }
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes: parse_field(parts[0], 0, 59)?,
            hours: parse_field(parts[1], 0, 23)?,
            days_of_month: parse_field(parts[2], 1, 31)?,
            months: parse_field(parts[3], 1, 12)?,
            days_of_week,
            dom_restricted: parts[2] != "*",
            dow_restricted: parts[4] != "*",
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether `t` (truncated to the minute) is a firing time.
    pub fn matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        if !self.minutes.contains(&t.minute())
            || !self.hours.contains(&t.hour())
            || !self.months.contains(&t.month())
        {
            return false;
        }
        let dom = self.days_of_month.contains(&t.day());
        let dow = self.days_of_week.contains(&t.weekday().num_days_from_sunday());
        // classic cron: when both day fields are restricted, either may match
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// First firing time strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut candidate = after.clone() + Duration::minutes(1);
        candidate = candidate.with_second(0)?.with_nanosecond(0)?;

        // Walk minute by minute, jumping whole hours when the hour cannot match.
        // Four years covers every satisfiable day/month combination.
        let limit = after.clone() + Duration::days(366 * 4);
        while candidate <= limit {
            if !self.hours.contains(&candidate.hour()) {
                candidate = candidate.clone() + Duration::minutes(i64::from(60 - candidate.minute()));
                continue;
            }
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

/// Parse a cron field into its sorted matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>> {
    let mut values = Vec::new();
    for item in field.split(',') {
        values.extend(parse_item(item.trim(), min, max).ok_or_else(|| {
            CourtwatchError::Config(format!("invalid cron field '{field}' (allowed {min}-{max})"))
        })?);
    }
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

fn parse_item(item: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => {
            let n: u32 = step.parse().ok()?;
            if n == 0 {
                return None;
            }
            (range, n)
        }
        None => (item, 1),
    };

    let (lo, hi) = if range == "*" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        (a.parse().ok()?, b.parse().ok()?)
    } else {
        let n: u32 = range.parse().ok()?;
        // "N/step" runs from N to the end of the field
        if step > 1 { (n, max) } else { (n, n) }
    };

    if lo < min || hi > max || lo > hi {
        return None;
    }
    Some((lo..=hi).step_by(step as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_every_ten_minutes() {
        let cron = CronSchedule::parse("*/10 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 18, 10, 2, 30).unwrap();
        let next = cron.next_after(&after).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (10, 10, 0));

        let on_boundary = Utc.with_ymd_and_hms(2026, 10, 18, 10, 10, 0).unwrap();
        assert_eq!(cron.next_after(&on_boundary).unwrap().minute(), 20);
    }

    #[test]
    fn test_rolls_over_midnight() {
        let cron = CronSchedule::parse("0 8 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let next = cron.next_after(&after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_ranges_and_lists() {
        let cron = CronSchedule::parse("0,30 8-10 * * 1-5").unwrap();
        // Saturday 2026-10-24 → Monday 08:00
        let after = Utc.with_ymd_and_hms(2026, 10, 24, 9, 0, 0).unwrap();
        let next = cron.next_after(&after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 26, 8, 0, 0).unwrap());

        let cron = CronSchedule::parse("5-20/5 * * * *").unwrap();
        assert_eq!(cron.minutes, vec![5, 10, 15, 20]);
    }

    #[test]
    fn test_sunday_as_seven() {
        let cron = CronSchedule::parse("0 12 * * 7").unwrap();
        assert_eq!(cron.days_of_week, vec![0]);
        let after = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        assert_eq!(
            cron.next_after(&after).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 25, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_keeps_time_zone() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let cron = CronSchedule::parse("0 18 * * *").unwrap();
        let after = tz.with_ymd_and_hms(2026, 10, 18, 17, 59, 0).unwrap();
        let next = cron.next_after(&after).unwrap();
        assert_eq!(next.hour(), 18);
        assert_eq!(next.offset(), &tz);
    }

    #[test]
    fn test_invalid_expressions() {
        for bad in ["bad", "* * * *", "*/0 * * * *", "60 * * * *", "* 5-2 * * *", "* * 0 * *"] {
            assert!(CronSchedule::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_impossible_schedule_has_no_next() {
        let cron = CronSchedule::parse("0 0 31 2 *").unwrap();
        assert!(cron.next_after(&Utc::now()).is_none());
    }
}
