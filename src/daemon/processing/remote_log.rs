use std::sync::Arc;

use anyhow::Result;

use crate::{daemon::accumulator::TimeReport, remote::TrackerApi};

use super::module::ReportProcessor;

/// Posts every report to the time-logging endpoint. There is no retry, a lost report only
/// costs server-side precision, the local total already counts it.
pub struct RemoteTimeLogger {
    api: Arc<dyn TrackerApi>,
}

impl RemoteTimeLogger {
    pub fn new(api: Arc<dyn TrackerApi>) -> Self {
        Self { api }
    }
}

impl ReportProcessor for RemoteTimeLogger {
    async fn process_next(&mut self, report: TimeReport) -> Result<()> {
        self.api.log_time(report).await
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
