//! Per-domain dwell time. At most one domain is tracked at a time, its interval is flushed into
//! the stored total whenever the active domain changes or a periodic tick forces it.

use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::{
    daemon::storage::{local::LocalStorage, store::KeyValueStore},
    domain::{resolve_domain, Domain},
    utils::time::local_timezone_offset_minutes,
};

/// One flushed interval, as sent to the time-logging endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeReport {
    pub domain: Domain,
    pub delta_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub timezone_offset_min: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainTimer {
    pub domain: Domain,
    /// Stored total of the domain, including every accepted flush of this run.
    pub accumulated_seconds: u64,
    pub session_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct AccumulatorSettings {
    pub max_delta: Duration,
    pub min_flush_spacing: Duration,
}

impl Default for AccumulatorSettings {
    fn default() -> Self {
        Self {
            max_delta: Duration::from_secs(600),
            min_flush_spacing: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushRejection {
    /// Nothing is being tracked.
    Idle,
    /// Less than a second passed, or the clock went backwards.
    NonPositive,
    /// The same domain was flushed too recently and the flush wasn't forced.
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed(TimeReport),
    Rejected(FlushRejection),
}

pub struct TimeAccumulator {
    current: Option<DomainTimer>,
    last_flush: HashMap<Domain, DateTime<Utc>>,
    settings: AccumulatorSettings,
    reports: UnboundedSender<TimeReport>,
}

impl TimeAccumulator {
    pub fn new(settings: AccumulatorSettings, reports: UnboundedSender<TimeReport>) -> Self {
        Self {
            current: None,
            last_flush: HashMap::new(),
            settings,
            reports,
        }
    }

    pub fn current(&self) -> Option<&DomainTimer> {
        self.current.as_ref()
    }

    /// Seconds tracked since the last flush of the current domain, unclamped.
    pub fn pending_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.current
            .as_ref()
            .and_then(|t| t.session_start)
            .map(|start| (now - start).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Handles the URL of the tab that is now in front. URLs that don't resolve to a tracked
    /// domain are ignored and the current domain keeps being tracked.
    pub async fn observe<S: KeyValueStore>(
        &mut self,
        url: Option<&str>,
        now: DateTime<Utc>,
        storage: &mut LocalStorage<S>,
    ) -> Result<()> {
        let Some(url) = url else {
            return Ok(());
        };
        let domain = match resolve_domain(url) {
            Ok(domain) => domain,
            Err(e) => {
                debug!("Not tracking {url:?}: {e}");
                return Ok(());
            }
        };
        if self.current.as_ref().is_some_and(|t| t.domain == domain) {
            return Ok(());
        }

        self.flush(false, now, storage).await?;
        let accumulated_seconds = storage.total(&domain).await?;
        info!("Tracking {domain} ({accumulated_seconds}s so far)");
        self.current = Some(DomainTimer {
            domain,
            accumulated_seconds,
            session_start: Some(now),
        });
        Ok(())
    }

    /// Moves the time since the interval started into the domain's total. The interval is
    /// clamped to the maximum delta. Unforced flushes of the same domain are spaced by at least
    /// the minimum flush spacing.
    pub async fn flush<S: KeyValueStore>(
        &mut self,
        force: bool,
        now: DateTime<Utc>,
        storage: &mut LocalStorage<S>,
    ) -> Result<FlushOutcome> {
        let Some(timer) = self.current.as_mut() else {
            return Ok(FlushOutcome::Rejected(FlushRejection::Idle));
        };
        let Some(start) = timer.session_start else {
            return Ok(FlushOutcome::Rejected(FlushRejection::Idle));
        };

        let max_delta = self.settings.max_delta.as_secs() as i64;
        let delta = (now - start).num_seconds().min(max_delta);
        if delta <= 0 {
            return Ok(FlushOutcome::Rejected(FlushRejection::NonPositive));
        }
        let delta = delta as u64;

        if !force {
            if let Some(last) = self.last_flush.get(&timer.domain) {
                let spacing = chrono::Duration::from_std(self.settings.min_flush_spacing)?;
                if now - *last < spacing {
                    debug!("Holding back flush of {}, flushed at {last}", timer.domain);
                    return Ok(FlushOutcome::Rejected(FlushRejection::RateLimited));
                }
            }
        }
        self.last_flush.insert(timer.domain.clone(), now);

        timer.accumulated_seconds += delta;
        timer.session_start = Some(now);
        let domain = timer.domain.clone();
        let total = timer.accumulated_seconds;

        // Local bookkeeping failures don't stop the report, the server copy is the one that
        // matters for the dashboard.
        if let Err(e) = storage.set_total(&domain, total).await {
            warn!("Couldn't persist total of {domain}: {e:?}");
        }
        if let Err(e) = storage.push_history(&domain).await {
            warn!("Couldn't append {domain} to history: {e:?}");
        }

        let report = TimeReport {
            domain,
            delta_seconds: delta,
            timestamp: now,
            timezone_offset_min: local_timezone_offset_minutes(now),
        };
        debug!("Flushed {report:?}");
        if self.reports.send(report.clone()).is_err() {
            warn!("Time reporter is gone, {}s of {} stay local", delta, report.domain);
        }
        Ok(FlushOutcome::Flushed(report))
    }

    /// Forgets the running total of the current domain after stored totals were cleared. The
    /// pending interval is kept.
    pub fn reset_totals(&mut self) {
        if let Some(timer) = self.current.as_mut() {
            timer.accumulated_seconds = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::TimeZone;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use crate::daemon::storage::store::MemoryStore;

    use super::*;

    struct Fixture {
        accumulator: TimeAccumulator,
        reports: UnboundedReceiver<TimeReport>,
        storage: LocalStorage<MemoryStore>,
        start: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            let (sender, reports) = mpsc::unbounded_channel();
            Self {
                accumulator: TimeAccumulator::new(AccumulatorSettings::default(), sender),
                reports,
                storage: LocalStorage::new(MemoryStore::default()),
                start: Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap(),
            }
        }

        fn at(&self, seconds: i64) -> DateTime<Utc> {
            self.start + chrono::Duration::seconds(seconds)
        }

        async fn observe(&mut self, url: &str, seconds: i64) -> Result<()> {
            let now = self.at(seconds);
            self.accumulator
                .observe(Some(url), now, &mut self.storage)
                .await
        }

        async fn flush(&mut self, force: bool, seconds: i64) -> Result<FlushOutcome> {
            let now = self.at(seconds);
            self.accumulator.flush(force, now, &mut self.storage).await
        }

        fn drain(&mut self) -> Vec<TimeReport> {
            let mut out = vec![];
            while let Ok(report) = self.reports.try_recv() {
                out.push(report);
            }
            out
        }
    }

    fn delta(outcome: FlushOutcome) -> u64 {
        match outcome {
            FlushOutcome::Flushed(report) => report.delta_seconds,
            FlushOutcome::Rejected(r) => panic!("flush rejected: {r:?}"),
        }
    }

    #[tokio::test]
    async fn forced_flush_reports_elapsed_time() -> Result<()> {
        let mut f = Fixture::new();
        f.observe("https://www.example.com/", 0).await?;

        assert_eq!(delta(f.flush(true, 65).await?), 65);

        let reports = f.drain();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].domain.as_str(), "example.com");
        assert_eq!(reports[0].timestamp, f.at(65));
        assert_eq!(f.storage.total(&"example.com".into()).await?, 65);
        assert_eq!(f.accumulator.pending_seconds(f.at(65)), 0);
        Ok(())
    }

    #[tokio::test]
    async fn delta_is_clamped_after_sleep() -> Result<()> {
        let mut f = Fixture::new();
        f.observe("https://example.com", 0).await?;

        assert_eq!(delta(f.flush(true, 3 * 3600).await?), 600);
        assert_eq!(f.storage.total(&"example.com".into()).await?, 600);
        Ok(())
    }

    #[tokio::test]
    async fn unforced_flushes_are_spaced() -> Result<()> {
        let mut f = Fixture::new();
        f.observe("https://example.com", 0).await?;

        assert_eq!(delta(f.flush(false, 5).await?), 5);
        assert_eq!(
            f.flush(false, 12).await?,
            FlushOutcome::Rejected(FlushRejection::RateLimited)
        );
        assert_eq!(delta(f.flush(false, 15).await?), 10);
        assert_eq!(delta(f.flush(true, 16).await?), 1);
        Ok(())
    }

    #[tokio::test]
    async fn zero_length_and_idle_flushes_are_rejected() -> Result<()> {
        let mut f = Fixture::new();
        assert_eq!(
            f.flush(true, 10).await?,
            FlushOutcome::Rejected(FlushRejection::Idle)
        );

        f.observe("https://example.com", 10).await?;
        assert_eq!(
            f.flush(true, 10).await?,
            FlushOutcome::Rejected(FlushRejection::NonPositive)
        );
        assert_eq!(
            f.flush(true, 5).await?,
            FlushOutcome::Rejected(FlushRejection::NonPositive)
        );
        assert!(f.drain().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn switching_domains_flushes_previous() -> Result<()> {
        let mut f = Fixture::new();
        f.observe("https://a.com", 0).await?;
        f.observe("https://a.com/other-page", 20).await?;
        f.observe("https://b.com", 30).await?;
        f.observe("chrome://newtab", 40).await?;

        let reports = f.drain();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].domain.as_str(), "a.com");
        assert_eq!(reports[0].delta_seconds, 30);
        assert_eq!(f.accumulator.current().unwrap().domain.as_str(), "b.com");
        assert_eq!(
            f.storage.history().await?,
            vec![Domain::from_host("a.com")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn tracking_resumes_from_stored_total() -> Result<()> {
        let mut f = Fixture::new();
        f.storage.set_total(&"a.com".into(), 100).await?;

        f.observe("https://a.com", 0).await?;
        assert_eq!(f.accumulator.current().unwrap().accumulated_seconds, 100);
        f.flush(true, 20).await?;
        f.flush(true, 40).await?;

        assert_eq!(f.storage.total(&"a.com".into()).await?, 140);
        let reported = f.drain().iter().map(|r| r.delta_seconds).sum::<u64>();
        assert_eq!(reported, 40);
        Ok(())
    }

    #[tokio::test]
    async fn no_report_exceeds_max_delta() -> Result<()> {
        let mut f = Fixture::new();
        let urls = ["https://a.com", "https://b.com", "https://a.com", "ftp://x"];
        let mut t = 0;
        for step in 0..40i64 {
            t += (step * 97) % 1300;
            f.observe(urls[step as usize % urls.len()], t).await?;
            if step % 3 == 0 {
                f.flush(step % 2 == 0, t + 1).await?;
            }
        }
        assert!(f.drain().iter().all(|r| r.delta_seconds <= 600 && r.delta_seconds > 0));
        Ok(())
    }
}
