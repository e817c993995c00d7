//! File-backed relay handler: appends each delivered work item to a JSON-lines outbox.

use crate::relay::queue::RelayWork;
use crate::relay::registry::RelayHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

pub struct OutboxHandler {
    path: PathBuf,
}

impl OutboxHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RelayHandler for OutboxHandler {
    async fn handle(&self, work: &RelayWork) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating outbox directory {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(work).context("serializing work item")?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening outbox {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("writing outbox {}", self.path.display()))?;
        file.flush().await?;
        log::debug!("wrote {} to {}", work.id, self.path.display());
        Ok(())
    }
}
