//! Error types for the bulk-ingest pipeline.

use snafu::prelude::*;

/// Errors that can occur during external storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// The URI could not be parsed.
    #[snafu(display("Invalid storage URI: {source}"))]
    InvalidUri { source: url::ParseError },

    /// The URI scheme has no registered driver.
    #[snafu(display("Unsupported storage scheme: {scheme}"))]
    UnsupportedScheme { scheme: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// The in-memory bucket registry lock was poisoned.
    #[snafu(display("Failed to lock memory bucket registry"))]
    BucketLock,
}

impl StorageError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

/// Errors surfaced by a bulk adder.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AdderError {
    /// The key collides with one already buffered or written at the
    /// adder's read timestamp.
    #[snafu(display("duplicate key: {key:?}"))]
    DuplicateKey { key: bytes::Bytes },

    /// The adder failed internally (buffer or flush machinery).
    #[snafu(display("bulk adder error: {message}"))]
    Internal { message: String },
}

impl AdderError {
    /// True for the duplicate-key signal, which the ingestor wraps with
    /// the owning index before making it fatal.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AdderError::DuplicateKey { .. })
    }
}

/// Errors from the job registry.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobError {
    /// No job with the given id.
    #[snafu(display("job {id} not found"))]
    NotFound { id: u64 },

    /// The job's progress record could not be read or written.
    #[snafu(display("job progress error: {message}"))]
    Progress { message: String },
}

/// Top-level import errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ImportError {
    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// A per-file error, wrapped with the file's URI. The URI is carried
    /// only in the error chain; it may hold credentials and must not be
    /// logged.
    #[snafu(display("{uri}: {source}"))]
    File {
        uri: String,
        #[snafu(source(from(ImportError, Box::new)))]
        source: Box<ImportError>,
    },

    /// A row-scoped converter error.
    #[snafu(display("{uri:?}: row {row}: {message}"))]
    Row {
        uri: String,
        row: u64,
        message: String,
    },

    /// IO error while reading or decompressing an input file.
    #[snafu(display("IO error: {source}"))]
    #[snafu(context(name(ImportIoSnafu)))]
    Io { source: std::io::Error },

    /// Job registry error.
    #[snafu(display("Job error: {source}"))]
    Job { source: JobError },

    /// The job's progress record carried an unexpected variant.
    #[snafu(display("unexpected progress details type"))]
    UnexpectedProgress,

    /// The KV key's table/index prefix could not be decoded.
    #[snafu(display("could not decode table/index prefix from key"))]
    KeyDecode,

    /// A duplicate key made it to one of the adders.
    #[snafu(display("duplicate key in {index}: {source}"))]
    #[snafu(context(name(ImportDuplicateKeySnafu)))]
    DuplicateKey { index: String, source: AdderError },

    /// Non-duplicate adder failure.
    #[snafu(display("Bulk adder error: {source}"))]
    Adder { source: AdderError },

    /// The converter could not be constructed for the requested format.
    #[snafu(display("Converter error: {message}"))]
    Converter { message: String },

    /// The upstream consumer stopped asking for rows.
    #[snafu(display("unexpected closure of consumer"))]
    ConsumerClosed,

    /// The import was cancelled.
    #[snafu(display("import cancelled"))]
    Cancelled,

    /// A pipeline channel closed while a peer still needed it.
    #[snafu(display("Channel closed unexpectedly"))]
    ChannelClosed,

    /// Task join error.
    #[snafu(display("Task join error: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

impl ImportError {
    /// Wrap an error with the file URI it belongs to.
    pub fn with_uri(self, uri: impl Into<String>) -> Self {
        ImportError::File {
            uri: uri.into(),
            source: Box::new(self),
        }
    }
}

impl From<StorageError> for ImportError {
    fn from(source: StorageError) -> Self {
        ImportError::Storage { source }
    }
}

impl From<JobError> for ImportError {
    fn from(source: JobError) -> Self {
        ImportError::Job { source }
    }
}

impl From<AdderError> for ImportError {
    fn from(source: AdderError) -> Self {
        ImportError::Adder { source }
    }
}

impl From<tokio::task::JoinError> for ImportError {
    fn from(source: tokio::task::JoinError) -> Self {
        ImportError::TaskJoin { source }
    }
}

/// Build a row-scoped error for converter implementations.
pub fn make_row_err(uri: &str, row: u64, message: impl Into<String>) -> ImportError {
    ImportError::Row {
        uri: uri.to_string(),
        row,
        message: message.into(),
    }
}

/// Attach file and row context to an existing error.
pub fn wrap_row_err(err: ImportError, uri: &str, row: u64) -> ImportError {
    ImportError::Row {
        uri: uri.to_string(),
        row,
        message: err.to_string(),
    }
}
