//! Queue consumer: delivers pending work to registered handlers, acknowledging only on success.

use crate::relay::queue::RedbWorkQueue;
use crate::relay::registry::RelayRegistry;
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    /// Left queued because the target is not registered in this process.
    pub skipped: usize,
    /// Handled, but the acknowledgement failed; may be delivered again.
    pub unacked: usize,
}

pub struct RelayWorker {
    queue: Arc<RedbWorkQueue>,
    registry: Arc<RelayRegistry>,
}

impl RelayWorker {
    pub fn new(queue: Arc<RedbWorkQueue>, registry: Arc<RelayRegistry>) -> Self {
        Self { queue, registry }
    }

    /// One pass over the pending items. Failed and skipped items stay queued for the next pass.
    pub async fn drain(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        for work in self.queue.pending().await? {
            let Some(handler) = self.registry.resolve(&work.target_id).await else {
                log::warn!(
                    "no handler for {} (work {}), leaving queued",
                    work.target_id,
                    work.id
                );
                report.skipped += 1;
                continue;
            };
            match handler.handle(&work).await {
                Ok(()) => match self.queue.ack(&work.id).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        log::error!(
                            "acknowledging {} (job {}) failed after delivery: {:#}",
                            work.id,
                            work.job_id,
                            e
                        );
                        report.unacked += 1;
                    }
                },
                Err(e) => {
                    log::error!(
                        "handler {} failed on {} (job {}): {:#}",
                        work.target_id,
                        work.id,
                        work.job_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        if report != DrainReport::default() {
            log::info!(
                "relay drain: {} delivered, {} failed, {} skipped, {} unacked",
                report.delivered,
                report.failed,
                report.skipped,
                report.unacked
            );
        }
        Ok(report)
    }
}
