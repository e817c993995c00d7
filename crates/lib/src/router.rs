//! Message router: the single entry point for received push messages.
//!
//! Every message runs the same steps in order: resolve relay settings, dispatch to the
//! relay target, probe the app state, decide on presentation, present, notify the
//! observer. A failing step is logged and the next one still runs.

use crate::config::{self, Config};
use crate::message::InboundMessage;
use crate::metadata::{JsonMetadataSource, MetadataSource};
use crate::notify::{should_present, MessageObserver, NotificationPresenter, ObserverSlot};
use crate::probe::{AppState, AppStateProbe, ProcfsProbe};
use crate::relay::{DispatchOutcome, RelayDispatcher, RelayRegistry, WorkQueue};
use crate::resolver::ConfigResolver;
use std::path::Path;
use std::sync::Arc;

/// What happened to the notification for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    Shown,
    Suppressed,
    Failed(String),
}

/// Per-message outcome of every step, for logging and inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReport {
    pub dispatch: DispatchOutcome,
    pub state: AppState,
    pub presentation: Presentation,
    pub observer_notified: bool,
}

pub struct MessageRouter {
    resolver: ConfigResolver,
    dispatcher: RelayDispatcher,
    probe: Arc<dyn AppStateProbe>,
    presenter: Arc<dyn NotificationPresenter>,
    observer: ObserverSlot,
}

impl MessageRouter {
    pub fn new(
        resolver: ConfigResolver,
        dispatcher: RelayDispatcher,
        probe: Arc<dyn AppStateProbe>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            probe,
            presenter,
            observer: ObserverSlot::new(),
        }
    }

    /// Register the observer (weakly), replacing any previous one. `None` clears it.
    pub fn set_callback(&self, observer: Option<&Arc<dyn MessageObserver>>) {
        self.observer.set(observer);
    }

    /// Probes walk the filesystem, so they run on the blocking pool.
    async fn current_state(&self) -> AppState {
        let probe = self.probe.clone();
        match tokio::task::spawn_blocking(move || probe.current_state()).await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("app state probe did not complete: {}", e);
                AppState::NotRunning
            }
        }
    }

    /// Route one received message. Always runs to completion.
    pub async fn on_message_received(&self, message: &InboundMessage) -> RouteReport {
        log::debug!("+on_message_received");
        log::debug!("intent: {}", message.to_uri());

        let config = self.resolver.resolve().await;

        let dispatch = self
            .dispatcher
            .dispatch(
                message,
                config.relay_target_id.as_deref(),
                config.relay_job_id,
            )
            .await;

        let state = self.current_state().await;
        log::debug!("app state: {}", state);

        let present = should_present(state, self.observer.get().as_deref());
        let presentation = if present {
            match self
                .presenter
                .present(message, config.channel_id.as_deref(), config.icon)
                .await
            {
                Ok(()) => Presentation::Shown,
                Err(e) => {
                    log::error!("presenting notification failed: {:#}", e);
                    Presentation::Failed(format!("{:#}", e))
                }
            }
        } else {
            log::debug!("notification suppressed by observer while in foreground");
            Presentation::Suppressed
        };

        // Re-read: the observer may have been registered or dropped since the decision.
        let observer_notified = match self.observer.get() {
            Some(observer) => {
                log::debug!("notifying observer");
                observer.on_message_received(message);
                true
            }
            None => false,
        };

        log::debug!("-on_message_received");
        RouteReport {
            dispatch,
            state,
            presentation,
            observer_notified,
        }
    }
}

/// Wire a router from application config: JSON metadata file and procfs probe. The
/// registry and queue are shared with whatever drains the queue.
pub fn build_router(
    config: &Config,
    config_path: &Path,
    registry: Arc<RelayRegistry>,
    queue: Arc<dyn WorkQueue>,
    presenter: Arc<dyn NotificationPresenter>,
    probe: Option<Arc<dyn AppStateProbe>>,
) -> MessageRouter {
    let metadata: Arc<dyn MetadataSource> = Arc::new(JsonMetadataSource::new(
        config::resolve_metadata_path(config, config_path),
    ));
    let dispatcher =
        RelayDispatcher::new(registry, queue).with_enqueue_timeout(config.queue.enqueue_timeout());
    let probe = probe.unwrap_or_else(|| {
        Arc::new(ProcfsProbe::new(
            config.app.proc_root.clone(),
            config.app.process_name.clone(),
        )) as Arc<dyn AppStateProbe>
    });
    MessageRouter::new(ConfigResolver::new(metadata), dispatcher, probe, presenter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Metadata, MetadataError, StaticMetadata};
    use crate::probe::FixedStateProbe;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock, Weak};
    use std::thread::ThreadId;

    struct NoQueue;

    #[async_trait]
    impl WorkQueue for NoQueue {
        async fn enqueue(&self, _job_id: i64, _target_id: &str, _payload: &InboundMessage) -> anyhow::Result<String> {
            anyhow::bail!("should not be called")
        }
    }

    struct BrokenPresenter;

    #[async_trait]
    impl NotificationPresenter for BrokenPresenter {
        async fn present(&self, _m: &InboundMessage, _c: Option<&str>, _i: Option<i64>) -> anyhow::Result<()> {
            anyhow::bail!("display unavailable")
        }
    }

    struct Unreadable;

    #[async_trait]
    impl MetadataSource for Unreadable {
        async fn read_metadata(&self) -> Result<Metadata, MetadataError> {
            Err(MetadataError::NotFound("manifest".into()))
        }
    }

    #[derive(Default)]
    struct Counting(std::sync::atomic::AtomicUsize);

    impl MessageObserver for Counting {
        fn wants_foreground_notification(&self) -> bool {
            true
        }

        fn on_message_received(&self, _message: &InboundMessage) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn router(metadata: Arc<dyn MetadataSource>, state: AppState) -> MessageRouter {
        let dispatcher = RelayDispatcher::new(Arc::new(RelayRegistry::new()), Arc::new(NoQueue));
        MessageRouter::new(
            ConfigResolver::new(metadata),
            dispatcher,
            Arc::new(FixedStateProbe(state)),
            Arc::new(BrokenPresenter),
        )
    }

    #[tokio::test]
    async fn presenter_failure_still_reaches_observer() {
        let r = router(Arc::new(StaticMetadata::default()), AppState::Background);
        let counting = Arc::new(Counting::default());
        let observer: Arc<dyn MessageObserver> = counting.clone();
        r.set_callback(Some(&observer));

        let report = r.on_message_received(&InboundMessage::new()).await;
        assert_eq!(report.dispatch, DispatchOutcome::NoTarget);
        assert_eq!(
            report.presentation,
            Presentation::Failed("display unavailable".into())
        );
        assert!(report.observer_notified);
        assert_eq!(counting.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreadable_metadata_still_routes() {
        let r = router(Arc::new(Unreadable), AppState::NotRunning);
        let report = r.on_message_received(&InboundMessage::new()).await;
        assert_eq!(report.dispatch, DispatchOutcome::NoTarget);
        assert_eq!(report.state, AppState::NotRunning);
        assert!(!report.observer_notified);
    }

    #[tokio::test]
    async fn dropped_observer_is_not_called() {
        let r = router(Arc::new(StaticMetadata::default()), AppState::Foreground);
        let observer: Arc<dyn MessageObserver> = Arc::new(Counting::default());
        r.set_callback(Some(&observer));
        drop(observer);
        let report = r.on_message_received(&InboundMessage::new()).await;
        assert!(!report.observer_notified);
        assert_ne!(report.presentation, Presentation::Suppressed);
    }

    type RouterAction = Box<dyn FnOnce(&MessageRouter) + Send>;

    /// Runs a one-shot action against its own router while presenting.
    #[derive(Default)]
    struct ActingPresenter {
        router: OnceLock<Weak<MessageRouter>>,
        action: Mutex<Option<RouterAction>>,
    }

    #[async_trait]
    impl NotificationPresenter for ActingPresenter {
        async fn present(&self, _m: &InboundMessage, _c: Option<&str>, _i: Option<i64>) -> anyhow::Result<()> {
            let action = self.action.lock().unwrap().take();
            let router = self.router.get().and_then(Weak::upgrade);
            if let (Some(action), Some(router)) = (action, router) {
                action(&router);
            }
            Ok(())
        }
    }

    /// Counts into a shared tally so the test holds no strong reference to the observer.
    struct Tally {
        wants_foreground: bool,
        count: Arc<AtomicUsize>,
    }

    impl MessageObserver for Tally {
        fn wants_foreground_notification(&self) -> bool {
            self.wants_foreground
        }

        fn on_message_received(&self, _message: &InboundMessage) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn acting_router(state: AppState, action: RouterAction) -> Arc<MessageRouter> {
        let presenter = Arc::new(ActingPresenter::default());
        *presenter.action.lock().unwrap() = Some(action);
        let dispatcher = RelayDispatcher::new(Arc::new(RelayRegistry::new()), Arc::new(NoQueue));
        let r = Arc::new(MessageRouter::new(
            ConfigResolver::new(Arc::new(StaticMetadata::default())),
            dispatcher,
            Arc::new(FixedStateProbe(state)),
            presenter.clone(),
        ));
        let _ = presenter.router.set(Arc::downgrade(&r));
        r
    }

    #[tokio::test]
    async fn observer_dropped_during_presentation_is_not_called() {
        let count = Arc::new(AtomicUsize::new(0));
        let observer: Arc<dyn MessageObserver> = Arc::new(Tally {
            wants_foreground: true,
            count: count.clone(),
        });
        let held = observer.clone();
        let r = acting_router(
            AppState::Foreground,
            Box::new(move |_: &MessageRouter| drop(held)),
        );
        r.set_callback(Some(&observer));
        drop(observer);

        let report = r.on_message_received(&InboundMessage::new()).await;
        assert_eq!(report.presentation, Presentation::Shown);
        assert!(!report.observer_notified);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn observer_cleared_during_presentation_is_not_called() {
        let count = Arc::new(AtomicUsize::new(0));
        let observer: Arc<dyn MessageObserver> = Arc::new(Tally {
            wants_foreground: true,
            count: count.clone(),
        });
        let r = acting_router(
            AppState::Foreground,
            Box::new(|r: &MessageRouter| r.set_callback(None)),
        );
        r.set_callback(Some(&observer));

        let report = r.on_message_received(&InboundMessage::new()).await;
        assert_eq!(report.presentation, Presentation::Shown);
        assert!(!report.observer_notified);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn observer_registered_during_presentation_is_notified() {
        let count = Arc::new(AtomicUsize::new(0));
        let observer: Arc<dyn MessageObserver> = Arc::new(Tally {
            wants_foreground: false,
            count: count.clone(),
        });
        let registered = observer.clone();
        let r = acting_router(
            AppState::Background,
            Box::new(move |r: &MessageRouter| r.set_callback(Some(&registered))),
        );

        let report = r.on_message_received(&InboundMessage::new()).await;
        assert_eq!(report.presentation, Presentation::Shown);
        assert!(report.observer_notified);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// Records the thread it was called on.
    #[derive(Default)]
    struct ThreadRecordingState(Mutex<Option<ThreadId>>);

    impl AppStateProbe for ThreadRecordingState {
        fn current_state(&self) -> AppState {
            *self.0.lock().unwrap() = Some(std::thread::current().id());
            AppState::Background
        }
    }

    struct PanickingState;

    impl AppStateProbe for PanickingState {
        fn current_state(&self) -> AppState {
            panic!("proc root vanished")
        }
    }

    fn router_with_state(source: Arc<dyn AppStateProbe>) -> MessageRouter {
        MessageRouter::new(
            ConfigResolver::new(Arc::new(StaticMetadata::default())),
            RelayDispatcher::new(Arc::new(RelayRegistry::new()), Arc::new(NoQueue)),
            source,
            Arc::new(ActingPresenter::default()),
        )
    }

    #[tokio::test]
    async fn state_is_computed_off_the_async_thread() {
        let recorder = Arc::new(ThreadRecordingState::default());
        let r = router_with_state(recorder.clone());
        let report = r.on_message_received(&InboundMessage::new()).await;
        assert_eq!(report.state, AppState::Background);
        let called_on = recorder.0.lock().unwrap().expect("state computed");
        assert_ne!(called_on, std::thread::current().id());
    }

    #[tokio::test]
    async fn crashed_state_computation_counts_as_not_running() {
        let r = router_with_state(Arc::new(PanickingState));
        let report = r.on_message_received(&InboundMessage::new()).await;
        assert_eq!(report.state, AppState::NotRunning);
        assert_eq!(report.presentation, Presentation::Shown);
    }
}
