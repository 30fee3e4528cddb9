//! The bulk adder seam.
//!
//! Adders buffer incoming KVs, re-sort them, build SSTs, and flush them
//! below MVCC into the key-value store. Their internals live in the
//! embedding system; the pipeline only depends on this trait.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::AdderError;

/// Counts accumulated by an adder across its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOpSummary {
    /// Total payload bytes ingested.
    pub data_size: u64,
    /// Primary-index rows ingested.
    pub rows: u64,
    /// Secondary-index entries ingested.
    pub index_entries: u64,
}

impl BulkOpSummary {
    /// Fold another summary into this one.
    pub fn add(&mut self, other: &BulkOpSummary) {
        self.data_size += other.data_size;
        self.rows += other.rows;
        self.index_entries += other.index_entries;
    }
}

/// Construction options for a bulk adder.
#[derive(Debug, Clone)]
pub struct BulkAdderOptions {
    /// Adder name, used in logging.
    pub name: String,
    /// Refuse to overwrite keys that already exist at the read timestamp.
    pub disallow_shadowing: bool,
    /// Silently drop exact key/value duplicates within this import. A
    /// duplicate key with a different value still surfaces as
    /// [`AdderError::DuplicateKey`].
    pub skip_duplicates: bool,
    /// Initial buffer size in bytes.
    pub min_buffer_size: u64,
    /// Buffer ceiling in bytes.
    pub max_buffer_size: u64,
    /// Buffer growth increment in bytes.
    pub step_buffer_size: u64,
    /// Target size of constructed SSTs.
    pub sst_size: u64,
    /// MVCC write timestamp, in nanoseconds.
    pub write_timestamp_nanos: i64,
}

/// Callback invoked by an adder after it has persisted a batch.
pub type OnFlush = Box<dyn Fn() + Send + Sync>;

/// A buffering bulk writer into the key-value store.
///
/// Implementations are internally synchronized: `add` and `flush` are
/// called from the ingest task only, while `is_empty` and the flush hook
/// run on adder-owned threads.
#[async_trait::async_trait]
pub trait BulkAdder: Send + Sync {
    /// Buffer one KV, flushing internally when the buffer fills.
    async fn add(&self, key: Bytes, value: Bytes) -> Result<(), AdderError>;

    /// Flush everything buffered. May take minutes on large imports.
    async fn flush(&self) -> Result<(), AdderError>;

    /// True when nothing is buffered or in flight.
    fn is_empty(&self) -> bool;

    /// Register the on-flush callback. The hook runs on adder-owned
    /// threads after each successful flush.
    fn set_on_flush(&self, hook: OnFlush);

    /// Counts accumulated so far.
    fn summary(&self) -> BulkOpSummary;

    /// Release adder resources. Must be invoked on every exit path.
    async fn close(&self);
}

/// Constructs bulk adders for the ingestor.
pub trait BulkAdderFactory: Send + Sync {
    fn make_adder(
        &self,
        opts: BulkAdderOptions,
    ) -> Result<std::sync::Arc<dyn BulkAdder>, AdderError>;
}
