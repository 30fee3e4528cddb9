//! Cluster-level settings consumed by the ingest pipeline.

use serde::{Deserialize, Serialize};

/// Bytes per kilobyte.
pub const KB: u64 = 1 << 10;
/// Bytes per megabyte.
pub const MB: u64 = 1 << 20;

/// Buffer sizing for one bulk adder: the adder starts at `min`, grows by
/// `step` on pressure, and never exceeds `max`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferSizes {
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

/// Settings handle for one import.
///
/// The primary-index adder's max buffer should be kept at or below the
/// secondary adder's: the PK stream fills faster, and a larger PK buffer
/// grows more aggressively and hogs memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Target SST size for adder flushes.
    #[serde(default = "default_max_import_batch_size")]
    pub max_import_batch_size: u64,
    /// Buffer sizing for the primary-index adder.
    #[serde(default = "default_pk_buffer_sizes")]
    pub pk_buffer: BufferSizes,
    /// Buffer sizing for the secondary-index adder.
    #[serde(default = "default_index_buffer_sizes")]
    pub index_buffer: BufferSizes,
}

fn default_max_import_batch_size() -> u64 {
    32 * MB
}

fn default_pk_buffer_sizes() -> BufferSizes {
    BufferSizes {
        min: 4 * MB,
        max: 16 * MB,
        step: 4 * MB,
    }
}

fn default_index_buffer_sizes() -> BufferSizes {
    BufferSizes {
        min: 4 * MB,
        max: 64 * MB,
        step: 4 * MB,
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_import_batch_size: default_max_import_batch_size(),
            pk_buffer: default_pk_buffer_sizes(),
            index_buffer: default_index_buffer_sizes(),
        }
    }
}

impl Settings {
    /// Buffer sizing for the requested adder.
    pub fn import_buffer_config_sizes(&self, is_pk_adder: bool) -> BufferSizes {
        if is_pk_adder {
            self.pk_buffer
        } else {
            self.index_buffer
        }
    }
}
