//! Avalanche: the bulk-ingest core of a SQL database's IMPORT subsystem.
//!
//! This crate handles:
//! - Reading externally hosted data files with compression detection and
//!   compressed-byte progress accounting
//! - Driving format converters that turn file streams into KV batches
//! - Sampling KVs upstream for split-point planning
//! - Direct ingestion through dual bulk adders (primary vs. secondary
//!   index) with per-file resume watermarks
//!
//! Format parsers, cloud storage drivers, the job registry, and the bulk
//! adders themselves are external collaborators behind trait seams.

pub mod adder;
pub mod config;
pub mod convert;
pub mod env;
pub mod error;
pub mod job;
pub mod kv;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod span;
pub mod spec;
pub mod storage;

// Re-export commonly used items
pub use adder::{BulkAdder, BulkAdderFactory, BulkAdderOptions, BulkOpSummary};
pub use config::Settings;
pub use env::ImportEnv;
pub use error::{AdderError, ImportError, StorageError};
pub use kv::{KvBatch, KvPair};
pub use pipeline::{ImportProcessor, emit_kvs, ingest_kvs, run_import};
pub use source::read_input_files;
pub use spec::{Compression, FileFormat, ImportSpec, InputFormat};
