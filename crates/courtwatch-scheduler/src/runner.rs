//! Watch loop — fires a scan cycle at each cron time.
//!
//! Cycles run inline on the loop, so two never overlap. A cycle that runs
//! past its deadline is dropped; a cycle that ends after the next firing
//! time simply waits for the one after (missed firings are not replayed).

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use courtwatch_core::config::CourtwatchConfig;
use courtwatch_core::error::{CourtwatchError, Result};

use crate::cron::CronSchedule;

/// How one cycle ended.
#[derive(Debug)]
pub enum RunOutcome<T> {
    Finished(T),
    Failed(CourtwatchError),
    TimedOut,
}

impl<T> RunOutcome<T> {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunOutcome::Finished(_))
    }
}

pub struct WatchRunner {
    schedule: CronSchedule,
    run_timeout: Duration,
    offset: FixedOffset,
}

impl WatchRunner {
    pub fn new(schedule: CronSchedule, run_timeout: Duration, offset: FixedOffset) -> Self {
        Self {
            schedule,
            run_timeout,
            offset,
        }
    }

    pub fn from_config(config: &CourtwatchConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.scan.utc_offset_hours * 3600).ok_or_else(|| {
            CourtwatchError::Config(format!("bad utc offset {}", config.scan.utc_offset_hours))
        })?;
        Ok(Self::new(
            CronSchedule::parse(&config.schedule.cron)?,
            Duration::from_secs(config.schedule.run_timeout_secs),
            offset,
        ))
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Next firing time after `now`, in the venue's local time.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        self.schedule.next_after(&now.with_timezone(&self.offset))
    }

    /// How long to sleep from `now` until the next firing.
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.next_fire(now)?;
        Some((next.with_timezone(&Utc) - now).to_std().unwrap_or_default())
    }

    /// Run one cycle under the deadline.
    pub async fn run_once<T, Fut>(&self, cycle: Fut) -> RunOutcome<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.run_timeout, cycle).await {
            Ok(Ok(value)) => RunOutcome::Finished(value),
            Ok(Err(e)) => {
                tracing::error!("❌ Cycle failed: {e}");
                RunOutcome::Failed(e)
            }
            Err(_) => {
                tracing::error!(
                    "⏱️ Cycle exceeded {}s and was dropped",
                    self.run_timeout.as_secs()
                );
                RunOutcome::TimedOut
            }
        }
    }

    /// Loop forever: sleep until the next firing, run `job`, repeat.
    /// Returns only if the schedule can never fire again.
    pub async fn run<T, F, Fut>(&self, mut job: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        tracing::info!(
            "⏰ Watching on '{}' (timeout {}s)",
            self.schedule.expression(),
            self.run_timeout.as_secs()
        );
        loop {
            let now = Utc::now();
            let (Some(next), Some(delay)) = (self.next_fire(now), self.delay_until_next(now)) else {
                return Err(CourtwatchError::Config(format!(
                    "cron '{}' never fires",
                    self.schedule.expression()
                )));
            };
            tracing::debug!("next cycle at {next}");
            tokio::time::sleep(delay).await;

            tracing::info!("🔔 Cycle fired at {}", Utc::now().with_timezone(&self.offset));
            self.run_once(job()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn runner(timeout: Duration) -> WatchRunner {
        WatchRunner::new(
            CronSchedule::parse("*/10 * * * *").unwrap(),
            timeout,
            FixedOffset::east_opt(8 * 3600).unwrap(),
        )
    }

    #[test]
    fn test_delay_until_next() {
        let r = runner(Duration::from_secs(180));
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 2, 3, 30).unwrap();
        assert_eq!(r.delay_until_next(now), Some(Duration::from_secs(390)));
        let next = r.next_fire(now).unwrap();
        assert_eq!(next.format("%H:%M").to_string(), "10:10");
    }

    #[tokio::test]
    async fn test_run_once_outcomes() {
        let r = runner(Duration::from_millis(50));

        let ok = r.run_once(async { Ok::<_, CourtwatchError>(7) }).await;
        assert!(matches!(ok, RunOutcome::Finished(7)));

        let failed = r
            .run_once(async { Err::<(), _>(CourtwatchError::Http("down".into())) })
            .await;
        assert!(matches!(failed, RunOutcome::Failed(CourtwatchError::Http(_))));

        let slow = r
            .run_once(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, CourtwatchError>(())
            })
            .await;
        assert!(matches!(slow, RunOutcome::TimedOut));
    }

    #[test]
    fn test_from_config() {
        let mut config = CourtwatchConfig::default();
        let r = WatchRunner::from_config(&config).unwrap();
        assert_eq!(r.schedule().expression(), "*/10 * * * *");
        config.schedule.cron = "every ten minutes".into();
        assert!(WatchRunner::from_config(&config).is_err());
    }
}
