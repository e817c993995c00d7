//! Relay settings resolved from application metadata once per process.

use crate::metadata::{Metadata, MetadataSource};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const DEFAULT_CHANNEL_ID_KEY: &str =
    "com.google.firebase.messaging.default_notification_channel_id";
pub const DEFAULT_ICON_KEY: &str = "com.google.firebase.messaging.default_notification_icon";
pub const RELAY_SERVICE_KEY: &str = "com.delphiworlds.kastri.FIREBASE_RELAY_SERVICE";
pub const RELAY_JOB_ID_KEY: &str = "com.delphiworlds.kastri.FIREBASE_RELAY_SERVICE_JOB_ID";

/// Notification and relay settings. Every field is optional; an empty config is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayConfig {
    pub channel_id: Option<String>,
    pub icon: Option<i64>,
    pub relay_target_id: Option<String>,
    pub relay_job_id: Option<i64>,
}

impl RelayConfig {
    /// Extract settings from raw metadata. The job id is only read when a relay target is set.
    pub fn from_metadata(meta: &Metadata) -> Self {
        let relay_target_id = string_value(meta, RELAY_SERVICE_KEY);
        let relay_job_id = if relay_target_id.is_some() {
            int_value(meta, RELAY_JOB_ID_KEY)
        } else {
            None
        };
        Self {
            channel_id: string_value(meta, DEFAULT_CHANNEL_ID_KEY),
            icon: int_value(meta, DEFAULT_ICON_KEY),
            relay_target_id,
            relay_job_id,
        }
    }
}

fn string_value(meta: &Metadata, key: &str) -> Option<String> {
    let v = meta.get(key)?;
    match v.as_str() {
        Some(s) => Some(s.to_string()),
        None => {
            log::warn!("metadata {} is not a string, ignoring", key);
            None
        }
    }
}

fn int_value(meta: &Metadata, key: &str) -> Option<i64> {
    let v = meta.get(key)?;
    match v.as_int() {
        Some(i) => Some(i),
        None => {
            log::warn!("metadata {} is not an integer, ignoring", key);
            None
        }
    }
}

/// Caches the first successfully read [`RelayConfig`] for the resolver's lifetime.
/// A failed read is not cached, so a later message tries again.
pub struct ConfigResolver {
    source: Arc<dyn MetadataSource>,
    cached: OnceCell<Arc<RelayConfig>>,
}

impl ConfigResolver {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            cached: OnceCell::new(),
        }
    }

    /// Return the cached config, reading metadata on first use. Never fails: an unreadable
    /// source yields an empty config.
    pub async fn resolve(&self) -> Arc<RelayConfig> {
        let res = self
            .cached
            .get_or_try_init(|| async {
                let meta = self.source.read_metadata().await?;
                log::debug!("loaded relay metadata ({} entries)", meta.len());
                Ok::<_, crate::metadata::MetadataError>(Arc::new(RelayConfig::from_metadata(&meta)))
            })
            .await;
        match res {
            Ok(config) => config.clone(),
            Err(e) => {
                log::warn!("unable to load metadata: {}", e);
                Arc::new(RelayConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataError, MetadataValue};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        reads: AtomicUsize,
        fail_first: usize,
        meta: Metadata,
    }

    #[async_trait]
    impl MetadataSource for CountingSource {
        async fn read_metadata(&self) -> Result<Metadata, MetadataError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(MetadataError::NotFound("test".into()));
            }
            Ok(self.meta.clone())
        }
    }

    fn full_meta() -> Metadata {
        let mut m = Metadata::new();
        m.insert(DEFAULT_CHANNEL_ID_KEY.into(), MetadataValue::Str("chan1".into()));
        m.insert(DEFAULT_ICON_KEY.into(), MetadataValue::Int(5));
        m.insert(RELAY_SERVICE_KEY.into(), MetadataValue::Str("com.example.Relay".into()));
        m.insert(RELAY_JOB_ID_KEY.into(), MetadataValue::Int(42));
        m
    }

    #[test]
    fn extracts_all_fields() {
        let c = RelayConfig::from_metadata(&full_meta());
        assert_eq!(
            c,
            RelayConfig {
                channel_id: Some("chan1".into()),
                icon: Some(5),
                relay_target_id: Some("com.example.Relay".into()),
                relay_job_id: Some(42),
            }
        );
    }

    #[test]
    fn job_id_ignored_without_target() {
        let mut m = full_meta();
        m.remove(RELAY_SERVICE_KEY);
        let c = RelayConfig::from_metadata(&m);
        assert_eq!(c.relay_target_id, None);
        assert_eq!(c.relay_job_id, None);
    }

    #[test]
    fn wrong_types_are_absent() {
        let mut m = Metadata::new();
        m.insert(DEFAULT_CHANNEL_ID_KEY.into(), MetadataValue::Int(7));
        m.insert(DEFAULT_ICON_KEY.into(), MetadataValue::Str("icon".into()));
        assert_eq!(RelayConfig::from_metadata(&m), RelayConfig::default());
    }

    #[tokio::test]
    async fn reads_source_once() {
        let source = Arc::new(CountingSource {
            reads: AtomicUsize::new(0),
            fail_first: 0,
            meta: full_meta(),
        });
        let resolver = ConfigResolver::new(source.clone());
        let a = resolver.resolve().await;
        let b = resolver.resolve().await;
        assert_eq!(a, b);
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_yields_empty_and_retries() {
        let source = Arc::new(CountingSource {
            reads: AtomicUsize::new(0),
            fail_first: 1,
            meta: full_meta(),
        });
        let resolver = ConfigResolver::new(source.clone());
        assert_eq!(*resolver.resolve().await, RelayConfig::default());
        assert_eq!(resolver.resolve().await.relay_job_id, Some(42));
        resolver.resolve().await;
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }
}
