//! The wire-level description of one import: which files to read, how to
//! interpret them, and whether to sample or ingest directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Input file format dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Csv,
    MysqlOutfile,
    Mysqldump,
    PgCopy,
    PgDump,
}

/// Compression of the input files.
///
/// `Auto` detects from the file name suffix (re-checking the URI path
/// component when the raw name does not match).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Auto,
    None,
    Gzip,
    Bzip,
}

/// Format plus per-format knobs carried by the import spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFormat {
    /// Format dialect.
    pub format: InputFormat,
    /// Compression hint for all input files.
    #[serde(default)]
    pub compression: Compression,
    /// Persist rows the parser rejects to `<uri>.rejected` instead of
    /// failing the import (MySQL outfile only).
    #[serde(default)]
    pub save_rejected: bool,
}

impl FileFormat {
    pub fn new(format: InputFormat) -> Self {
        Self {
            format,
            compression: Compression::Auto,
            save_rejected: false,
        }
    }
}

/// Where this processor's progress lands in the job's per-slot arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressSpec {
    /// Job to report progress against.
    pub job_id: u64,
    /// This processor's slot in the job's sampling/read progress arrays.
    pub slot: usize,
    /// Fraction of the overall job this processor accounts for.
    pub contribution: f32,
}

/// One import's worth of work for a single processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSpec {
    /// Input files, keyed by a stable slot id (the file's index in the
    /// original URI list). Iteration order is deliberately unspecified;
    /// every KV batch self-identifies by slot id.
    pub uris: HashMap<i32, String>,
    /// Format dialect and compression.
    pub format: FileFormat,
    /// MVCC write timestamp for ingested KVs, in nanoseconds.
    pub walltime_nanos: i64,
    /// Sampling byte budget. Zero forwards every KV.
    #[serde(default)]
    pub sample_size: i64,
    /// Seed for the sampling PRNG. `None` seeds from entropy; tests pin
    /// it for reproducibility.
    #[serde(default)]
    pub sample_seed: Option<u64>,
    /// Ingest through the bulk adders instead of emitting sampled rows.
    #[serde(default)]
    pub ingest_directly: bool,
    /// Progress addressing for the owning job.
    #[serde(default)]
    pub progress: ProgressSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_round_trips() {
        let mut uris = HashMap::new();
        uris.insert(0, "file:///tmp/a.csv".to_string());
        uris.insert(1, "file:///tmp/b.csv.gz".to_string());
        let spec = ImportSpec {
            uris,
            format: FileFormat::new(InputFormat::Csv),
            walltime_nanos: 42,
            sample_size: 1024,
            sample_seed: Some(7),
            ingest_directly: true,
            progress: ProgressSpec {
                job_id: 9,
                slot: 1,
                contribution: 0.5,
            },
        };

        let json = serde_json::to_string(&spec).unwrap();
        let restored: ImportSpec = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.uris.len(), 2);
        assert_eq!(restored.format.format, InputFormat::Csv);
        assert_eq!(restored.format.compression, Compression::Auto);
        assert_eq!(restored.walltime_nanos, 42);
        assert!(restored.ingest_directly);
    }

    #[test]
    fn test_format_defaults() {
        let format: FileFormat = serde_json::from_str(r#"{"format":"csv"}"#).unwrap();
        assert_eq!(format.compression, Compression::Auto);
        assert!(!format.save_rejected);
    }
}
