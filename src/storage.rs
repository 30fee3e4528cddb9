//! External storage abstraction for input files.
//!
//! Each [`ExternalStorage`] handle is bound to a single object at
//! construction time. Local filesystem and in-memory (`mem://`) backends
//! are provided; cloud schemes parse into a config but have no driver
//! here and must be supplied by the embedding system.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use url::Url;

use crate::error::{
    BucketLockSnafu, InvalidUriSnafu, ObjectStoreSnafu, StorageError, UnsupportedSchemeSnafu,
};

/// Parsed storage location for one URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConf {
    /// A file on the local filesystem.
    Local { path: String },
    /// An object in a named in-memory bucket.
    Memory { bucket: String, path: String },
    /// A recognized remote scheme with no driver in this crate. Only the
    /// scheme is retained; the rest of the URI may carry credentials.
    Remote { scheme: String },
}

impl StorageConf {
    /// Parse a URI into a storage config.
    ///
    /// Bare paths (no scheme) are treated as local files.
    pub fn from_uri(uri: &str) -> Result<Self, StorageError> {
        if !uri.contains("://") {
            return Ok(StorageConf::Local {
                path: uri.to_string(),
            });
        }
        let url = Url::parse(uri).context(InvalidUriSnafu)?;
        match url.scheme() {
            "file" => Ok(StorageConf::Local {
                path: url.path().to_string(),
            }),
            "mem" => Ok(StorageConf::Memory {
                bucket: url.host_str().unwrap_or_default().to_string(),
                path: url.path().trim_start_matches('/').to_string(),
            }),
            other => Ok(StorageConf::Remote {
                scheme: other.to_string(),
            }),
        }
    }
}

/// A handle to one externally stored object.
#[async_trait]
pub trait ExternalStorage: std::fmt::Debug + Send + Sync {
    /// Size of the object in bytes. Errors and zero sizes downgrade the
    /// reader to per-file progress.
    async fn size(&self) -> Result<u64, StorageError>;

    /// Read the whole object.
    async fn read_file(&self) -> Result<Bytes, StorageError>;

    /// Write the object, replacing any existing content.
    async fn write_file(&self, content: Bytes) -> Result<(), StorageError>;
}

/// Constructs [`ExternalStorage`] handles from URIs.
#[async_trait]
pub trait StorageFactory: Send + Sync {
    async fn make_storage(&self, uri: &str) -> Result<Arc<dyn ExternalStorage>, StorageError>;
}

/// An [`ExternalStorage`] over an `object_store` backend.
#[derive(Debug)]
struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    location: Path,
}

#[async_trait]
impl ExternalStorage for ObjectStorage {
    async fn size(&self) -> Result<u64, StorageError> {
        let meta = self
            .store
            .head(&self.location)
            .await
            .context(ObjectStoreSnafu)?;
        Ok(meta.size as u64)
    }

    async fn read_file(&self) -> Result<Bytes, StorageError> {
        self.store
            .get(&self.location)
            .await
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)
    }

    async fn write_file(&self, content: Bytes) -> Result<(), StorageError> {
        self.store
            .put(&self.location, PutPayload::from(content))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }
}

/// Default storage factory: local filesystem plus named in-memory
/// buckets. Memory buckets are shared across handles from the same
/// factory so a probe and a later read see the same data.
#[derive(Default)]
pub struct ObjectStorageFactory {
    memory: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl ObjectStorageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn memory_bucket(&self, bucket: &str) -> Result<Arc<InMemory>, StorageError> {
        let mut buckets = self.memory.lock().map_err(|_| BucketLockSnafu.build())?;
        Ok(buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()))
            .clone())
    }
}

#[async_trait]
impl StorageFactory for ObjectStorageFactory {
    async fn make_storage(&self, uri: &str) -> Result<Arc<dyn ExternalStorage>, StorageError> {
        match StorageConf::from_uri(uri)? {
            StorageConf::Local { path } => {
                let location = Path::from_absolute_path(&path)
                    .map_err(|source| object_store::Error::InvalidPath { source })
                    .context(ObjectStoreSnafu)?;
                Ok(Arc::new(ObjectStorage {
                    store: Arc::new(object_store::local::LocalFileSystem::new()),
                    location,
                }))
            }
            StorageConf::Memory { bucket, path } => Ok(Arc::new(ObjectStorage {
                store: self.memory_bucket(&bucket)?,
                location: Path::from(path),
            })),
            StorageConf::Remote { scheme } => UnsupportedSchemeSnafu { scheme }.fail(),
        }
    }
}
