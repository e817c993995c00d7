//! Relay dispatch: forward a received message to the configured downstream target.

use crate::message::InboundMessage;
use crate::relay::queue::WorkQueue;
use crate::relay::registry::RelayRegistry;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one dispatch attempt. Only ever logged; none of these stop message routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No relay target configured.
    NoTarget,
    /// Target configured without a usable job id.
    MissingJobId { target_id: String },
    /// Target id has no registered handler.
    UnknownTarget { target_id: String },
    Enqueued { target_id: String, job_id: i64, work_id: String },
    /// The queue rejected the item or did not answer in time.
    EnqueueFailed { target_id: String, reason: String },
}

impl DispatchOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, DispatchOutcome::Enqueued { .. })
    }
}

pub struct RelayDispatcher {
    registry: Arc<RelayRegistry>,
    queue: Arc<dyn WorkQueue>,
    enqueue_timeout: Duration,
}

impl RelayDispatcher {
    pub fn new(registry: Arc<RelayRegistry>, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            registry,
            queue,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Enqueue `message` for `target_id` under `job_id`. At most one enqueue per call.
    pub async fn dispatch(
        &self,
        message: &InboundMessage,
        target_id: Option<&str>,
        job_id: Option<i64>,
    ) -> DispatchOutcome {
        let Some(target_id) = target_id else {
            return DispatchOutcome::NoTarget;
        };
        let job_id = match job_id {
            Some(id) if id != 0 => id,
            _ => {
                log::error!("no job id specified for {}", target_id);
                return DispatchOutcome::MissingJobId {
                    target_id: target_id.to_string(),
                };
            }
        };
        if !self.registry.contains(target_id).await {
            log::error!("could not find relay target: {}", target_id);
            return DispatchOutcome::UnknownTarget {
                target_id: target_id.to_string(),
            };
        }

        log::debug!("enqueuing work for {} (job {})", target_id, job_id);
        let res = tokio::time::timeout(
            self.enqueue_timeout,
            self.queue.enqueue(job_id, target_id, message),
        )
        .await;
        match res {
            Ok(Ok(work_id)) => {
                log::info!("enqueued {} for {} (job {})", work_id, target_id, job_id);
                DispatchOutcome::Enqueued {
                    target_id: target_id.to_string(),
                    job_id,
                    work_id,
                }
            }
            Ok(Err(e)) => {
                log::error!("enqueue for {} failed: {:#}", target_id, e);
                DispatchOutcome::EnqueueFailed {
                    target_id: target_id.to_string(),
                    reason: format!("{:#}", e),
                }
            }
            Err(_) => {
                log::error!(
                    "enqueue for {} timed out after {:?}",
                    target_id,
                    self.enqueue_timeout
                );
                DispatchOutcome::EnqueueFailed {
                    target_id: target_id.to_string(),
                    reason: "timed out".to_string(),
                }
            }
        }
    }
}
