use anyhow::Result;
use module::ReportProcessor;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::accumulator::TimeReport;

pub mod module;
pub mod remote_log;

/// Drains the reports emitted by the accumulator. Each report is handed to the processor once;
/// a failure is logged and the report is dropped. Ends when the tracker drops its sender.
pub struct ProcessingModule<Processor> {
    receiver: UnboundedReceiver<TimeReport>,
    processor: Processor,
}

impl<P: ReportProcessor> ProcessingModule<P> {
    pub fn new(receiver: UnboundedReceiver<TimeReport>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(report) = self.receiver.recv().await {
            debug!("Processing report {:?}", report);
            match self.processor.process_next(report.clone()).await {
                Ok(_) => {
                    info!("Reported {}s on {}", report.delta_seconds, report.domain)
                }
                Err(e) => {
                    warn!("Dropping report {:?}: {e:?}", report)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
