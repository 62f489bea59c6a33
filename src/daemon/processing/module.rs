use anyhow::Result;

use crate::daemon::accumulator::TimeReport;

/// Consumer of flushed intervals. Implementations decide where a report ends up; the
/// [ProcessingModule](super::ProcessingModule) only drives them.
pub trait ReportProcessor {
    fn process_next(&mut self, report: TimeReport) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
