//! Durable work queue for relayed payloads.
//!
//! `RedbWorkQueue` stores pending work in a redb table keyed by a monotonically increasing
//! sequence number, with a second table mapping work id to sequence. An item stays in the
//! pending table until it is acknowledged, then both rows are removed in one transaction.

use crate::message::InboundMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PENDING: TableDefinition<u64, &[u8]> = TableDefinition::new("relay_pending");
const BY_ID: TableDefinition<&str, u64> = TableDefinition::new("relay_pending_by_id");

/// One unit of relayed work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayWork {
    pub id: String,
    pub job_id: i64,
    pub target_id: String,
    pub enqueued_at: DateTime<Utc>,
    pub payload: InboundMessage,
}

impl RelayWork {
    pub fn new(job_id: i64, target_id: impl Into<String>, payload: InboundMessage) -> Self {
        Self {
            id: format!("work-{}", uuid::Uuid::new_v4()),
            job_id,
            target_id: target_id.into(),
            enqueued_at: Utc::now(),
            payload,
        }
    }
}

/// Host durable queue: accepted work must survive process death and be delivered at least once.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Persist one item; returns its work id.
    async fn enqueue(&self, job_id: i64, target_id: &str, payload: &InboundMessage) -> Result<String>;
}

pub struct RedbWorkQueue {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbWorkQueue {
    /// Open (or create) the queue database at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating queue directory {}", parent.display()))?;
        }
        let db = Database::create(&path)
            .with_context(|| format!("opening queue database {}", path.display()))?;

        // Ensure tables exist
        let write_txn = db.begin_write()?;
        write_txn.open_table(PENDING)?;
        write_txn.open_table(BY_ID)?;
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Work items not yet acknowledged, in enqueue order. Undecodable rows are skipped.
    pub async fn pending(&self) -> Result<Vec<RelayWork>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(PENDING)?;
            let mut out = Vec::new();
            for entry in table.iter()? {
                let (seq, value) = entry?;
                match serde_json::from_slice::<RelayWork>(value.value()) {
                    Ok(work) => out.push(work),
                    Err(e) => log::warn!("skipping undecodable work item #{}: {}", seq.value(), e),
                }
            }
            Ok::<_, anyhow::Error>(out)
        })
        .await
        .context("queue read task")?
    }

    /// Number of unacknowledged items.
    pub async fn len(&self) -> Result<usize> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(PENDING)?;
            let mut n = 0;
            for entry in table.iter()? {
                entry?;
                n += 1;
            }
            Ok::<_, anyhow::Error>(n)
        })
        .await
        .context("queue read task")?
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Remove a delivered item. Fails if `work_id` is not pending.
    pub async fn ack(&self, work_id: &str) -> Result<()> {
        let db = self.db.clone();
        let work_id = work_id.to_string();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write()?;
            let seq = {
                let mut by_id = write_txn.open_table(BY_ID)?;
                let removed = by_id.remove(work_id.as_str())?;
                removed.map(|g| g.value())
            };
            let Some(seq) = seq else {
                write_txn.abort()?;
                anyhow::bail!("work {} is not pending", work_id);
            };
            {
                let mut pending = write_txn.open_table(PENDING)?;
                pending.remove(&seq)?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .context("queue ack task")?
    }
}

#[async_trait]
impl WorkQueue for RedbWorkQueue {
    async fn enqueue(&self, job_id: i64, target_id: &str, payload: &InboundMessage) -> Result<String> {
        let work = RelayWork::new(job_id, target_id, payload.clone());
        let serialized = serde_json::to_vec(&work).context("serializing work item")?;
        let work_id = work.id.clone();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write()?;
            {
                let mut pending = write_txn.open_table(PENDING)?;
                let seq = pending.last()?.map(|(k, _)| k.value() + 1).unwrap_or(0);
                pending.insert(seq, serialized.as_slice())?;
                let mut by_id = write_txn.open_table(BY_ID)?;
                by_id.insert(work_id.as_str(), seq)?;
            }
            write_txn.commit()?;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .context("queue write task")??;
        Ok(work.id)
    }
}
