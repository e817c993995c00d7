//! Relay target registry: register handler factories by target id and resolve them on demand.

use crate::relay::queue::RelayWork;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Downstream consumer of relayed work.
#[async_trait]
pub trait RelayHandler: Send + Sync {
    /// Process one work item. An error leaves the item queued for a later attempt.
    async fn handle(&self, work: &RelayWork) -> anyhow::Result<()>;
}

/// Builds a handler instance for a target.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn RelayHandler> + Send + Sync>;

/// Registry of target ids to handler factories. Populated at startup; an unknown id is a
/// normal lookup miss.
pub struct RelayRegistry {
    inner: Arc<RwLock<HashMap<String, HandlerFactory>>>,
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a factory for `id`, replacing any previous registration.
    pub async fn register<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn RelayHandler> + Send + Sync + 'static,
    {
        let id = id.into();
        let mut g = self.inner.write().await;
        if g.insert(id.clone(), Arc::new(factory)).is_some() {
            log::debug!("relay target {} re-registered", id);
        }
    }

    /// Register a single shared handler instance for `id`.
    pub async fn register_handler(&self, id: impl Into<String>, handler: Arc<dyn RelayHandler>) {
        self.register(id, move || handler.clone()).await;
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }

    /// Instantiate the handler registered for `id`.
    pub async fn resolve(&self, id: &str) -> Option<Arc<dyn RelayHandler>> {
        let factory = self.inner.read().await.get(id).cloned()?;
        Some(factory())
    }
}
