//! Application metadata source: the named string/int values the relay reads its settings from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A single metadata value. Anything other than a string or an integer is kept but ignored by readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Str(String),
    Other(serde_json::Value),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata not found: {0}")]
    NotFound(String),
    #[error("reading metadata: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reads the host application's metadata. May fail; callers treat failure as "no settings".
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn read_metadata(&self) -> Result<Metadata, MetadataError>;
}

/// Metadata stored as a flat JSON object on disk.
pub struct JsonMetadataSource {
    path: PathBuf,
}

impl JsonMetadataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MetadataSource for JsonMetadataSource {
    async fn read_metadata(&self) -> Result<Metadata, MetadataError> {
        let s = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetadataError::NotFound(self.path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&s)?)
    }
}

/// In-memory metadata, for embedding hosts that already hold the values.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata(pub Metadata);

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn read_metadata(&self) -> Result<Metadata, MetadataError> {
        Ok(self.0.clone())
    }
}
