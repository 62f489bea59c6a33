use std::{sync::Arc, time::Duration};

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::{daemon::tracker::TrackerEvent, utils::clock::Clock};

/// Runs `job` right away and then once per `period` until shutdown, forwarding whatever event
/// it produces to the tracker.
pub struct Poller<F> {
    name: &'static str,
    next: mpsc::Sender<TrackerEvent>,
    job: F,
    shutdown: CancellationToken,
    period: Duration,
    clock: Arc<dyn Clock>,
}

impl<F> Poller<F>
where
    F: FnMut() -> BoxFuture<'static, Option<TrackerEvent>>,
{
    pub fn new(
        name: &'static str,
        next: mpsc::Sender<TrackerEvent>,
        job: F,
        shutdown: CancellationToken,
        period: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            next,
            job,
            shutdown,
            period,
            clock,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.clock.instant();
        loop {
            poll_point += self.period;

            let span = info_span!("poll", job = self.name);
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                event = (self.job)().instrument(span) => event,
            };
            if let Some(event) = event {
                debug!("{} produced {:?}", self.name, event);
                if self.next.send(event).await.is_err() {
                    error!("Tracker stopped before {} did", self.name);
                    return Ok(());
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(poll_point) => ()
            }
        }
    }
}
