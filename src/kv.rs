//! KV batch types and the table/index key prefix codec.
//!
//! Every key produced by a converter starts with two uvarints: the table
//! id and the index id. Index id 1 is the primary index; everything else
//! is a secondary index. The ingestor routes on this prefix.

use bytes::Bytes;

use crate::error::ImportError;

/// Index id of a table's primary index.
pub const PRIMARY_INDEX_ID: u32 = 1;

/// Reserved table id holding schema descriptors. Keys in this table are
/// always forwarded by the sampler, regardless of the sampling outcome.
pub const DESCRIPTOR_TABLE_ID: u32 = 3;

/// One key-value pair. The value is already MVCC-encoded raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: Bytes,
    pub value: Bytes,
}

impl KvPair {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Total payload size, the quantity the sampler weighs by.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// A unit of work traversing the pipeline: ordered KVs plus the source
/// file's slot id, row watermark, and fraction-of-file progress.
///
/// Batches are immutable once emitted. Keys within a batch need not be
/// sorted; the adders re-sort before SST construction.
#[derive(Debug, Clone)]
pub struct KvBatch {
    /// Slot id of the source file.
    pub source: i32,
    /// Rows of the source consumed to produce this batch.
    pub last_row: u64,
    /// Fraction of the source file consumed, in [0, 1].
    pub progress: f32,
    /// The pairs themselves.
    pub kvs: Vec<KvPair>,
}

fn put_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

fn take_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, b) in buf.iter().enumerate() {
        if shift > 63 {
            return None;
        }
        value |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

/// Encode a `(table_id, index_id)` key prefix.
pub fn encode_table_index_prefix(table_id: u32, index_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    put_uvarint(&mut buf, u64::from(table_id));
    put_uvarint(&mut buf, u64::from(index_id));
    buf
}

/// Decode the `(table_id, index_id)` prefix from a key.
pub fn decode_table_index_prefix(key: &[u8]) -> Result<(u32, u32), ImportError> {
    let (table, n) = take_uvarint(key).ok_or(ImportError::KeyDecode)?;
    let (index, _) = take_uvarint(&key[n..]).ok_or(ImportError::KeyDecode)?;
    if table > u64::from(u32::MAX) || index > u64::from(u32::MAX) {
        return Err(ImportError::KeyDecode);
    }
    Ok((table as u32, index as u32))
}

/// True if the key addresses the reserved descriptor table.
pub fn is_descriptor_key(key: &[u8]) -> bool {
    matches!(decode_table_index_prefix(key), Ok((DESCRIPTOR_TABLE_ID, _)))
}

/// Build a key with the given prefix and suffix bytes. Converters and
/// tests use this to produce routable keys.
pub fn make_key(table_id: u32, index_id: u32, suffix: &[u8]) -> Bytes {
    let mut buf = encode_table_index_prefix(table_id, index_id);
    buf.extend_from_slice(suffix);
    Bytes::from(buf)
}
