//! Relay of raw push payloads to downstream handlers.
//!
//! The dispatcher writes work into a durable queue keyed by job id; the worker drains the
//! queue and hands each item to the handler registered for its target id.

mod dispatcher;
mod outbox;
mod queue;
mod registry;
mod worker;

pub use dispatcher::{DispatchOutcome, RelayDispatcher, DEFAULT_ENQUEUE_TIMEOUT};
pub use outbox::OutboxHandler;
pub use queue::{RedbWorkQueue, RelayWork, WorkQueue};
pub use registry::{HandlerFactory, RelayHandler, RelayRegistry};
pub use worker::{DrainReport, RelayWorker};
