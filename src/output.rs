//! The upstream row sink produced by this pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

/// A two-column `(key, value)` row pushed upstream. Sampling mode leaves
/// the value empty for rows forwarded only as split-point candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: Bytes,
    pub value: Bytes,
}

impl Row {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A progress-metadata record: per-slot resume-safe row watermarks and
/// fraction of input consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkProgress {
    pub completed_row: HashMap<i32, u64>,
    pub completed_fraction: HashMap<i32, f32>,
}

/// Out-of-band records pushed alongside rows.
#[derive(Debug, Clone)]
pub enum ProducerMetadata {
    Progress(BulkProgress),
    Error(String),
}

/// Status returned by the consumer after each push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStatus {
    /// Keep pushing.
    NeedMoreRows,
    /// The consumer wants only metadata from here on.
    DrainRequested,
    /// The consumer is gone.
    ConsumerClosed,
}

/// The upstream consumer of rows and metadata.
///
/// Implementations are internally synchronized: the sampler pushes rows
/// while the orchestrator's caller pushes progress metadata.
#[async_trait]
pub trait RowReceiver: Send + Sync {
    async fn push(&self, row: Option<Row>, meta: Option<ProducerMetadata>) -> ConsumerStatus;
}
