//! File-set reading: size probing, per-file streaming, progress
//! bookkeeping, and the rejected-row sink.

pub mod compression;
pub mod reader;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::convert::ProgressReporter;
use crate::env::ImportEnv;
use crate::error::ImportError;
use crate::spec::{FileFormat, InputFormat};
use crate::storage::StorageFactory;

pub use reader::{ByteCounter, FileReader, ReadCounter};

/// Compressed bytes between progress reports. A low value causes
/// excessive job-table updates, which balloon under MVCC versioning.
const PROGRESS_BYTES: u64 = 100 << 20;

/// Per-file progress callback handed to the parser: throttled to
/// [`PROGRESS_BYTES`] of compressed input, except when the parser passes
/// `finished = true`.
pub struct FileProgress {
    mode: Option<ByteProgress>,
}

struct ByteProgress {
    counter: ReadCounter,
    total_bytes: u64,
    base: u64,
    last_reported: u64,
    reporter: Arc<dyn ProgressReporter>,
}

impl FileProgress {
    /// Byte-based progress across the whole file set. `base` is the
    /// count already consumed by earlier files.
    fn from_bytes(
        counter: ReadCounter,
        total_bytes: u64,
        base: u64,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            mode: Some(ByteProgress {
                counter,
                total_bytes,
                base,
                last_reported: 0,
                reporter,
            }),
        }
    }

    /// No byte-based progress: every update is a no-op.
    pub fn disabled() -> Self {
        Self { mode: None }
    }

    /// Report progress if enough input was consumed since the last
    /// report, or unconditionally when `finished`.
    pub async fn update(&mut self, finished: bool) -> Result<(), ImportError> {
        let Some(bytes) = &mut self.mode else {
            return Ok(());
        };
        let n = bytes.counter.get();
        let progressed = n - bytes.last_reported;
        if finished || progressed > PROGRESS_BYTES {
            bytes.last_reported = n;
            let fraction = (bytes.base + n) as f32 / bytes.total_bytes as f32;
            bytes.reporter.report(fraction).await?;
        }
        Ok(())
    }
}

/// The per-file parsing callback a converter supplies to
/// [`read_input_files`]: consume the decompressed stream, emit KV
/// batches, and push any rejected rows on the channel when present.
#[async_trait]
pub trait FileParser: Send {
    async fn read_file(
        &mut self,
        input: &mut FileReader,
        slot: i32,
        uri: &str,
        progress: &mut FileProgress,
        rejected: Option<mpsc::Sender<String>>,
    ) -> Result<(), ImportError>;
}

/// Read every input file through `parser`.
///
/// Sizes are probed up front; if any probe fails or reports zero, byte
/// progress is abandoned and per-file progress is reported instead.
/// Iteration follows the map's order, which is deliberately unstable:
/// every KV batch self-identifies by slot id. Any per-file error is
/// wrapped with the file's URI and is fatal to the import.
pub async fn read_input_files<P: FileParser>(
    cancel: CancellationToken,
    env: &ImportEnv,
    files: &HashMap<i32, String>,
    format: &FileFormat,
    parser: &mut P,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<(), ImportError> {
    let mut total_bytes: u64 = 0;
    let mut file_sizes: HashMap<i32, u64> = HashMap::with_capacity(files.len());
    for (id, uri) in files {
        let storage = env
            .storage
            .make_storage(uri)
            .await
            .map_err(|e| ImportError::from(e).with_uri(uri))?;
        match storage.size().await {
            Ok(size) if size > 0 => {
                file_sizes.insert(*id, size);
                total_bytes += size;
            }
            _ => {
                // The URI could leak auth information, so it stays out of
                // the log line.
                info!("could not fetch file size; falling back to per-file progress");
                total_bytes = 0;
                break;
            }
        }
    }
    let update_from_bytes = total_bytes > 0;

    let mut read_base: u64 = 0;
    let mut current_file = 0usize;
    for (id, uri) in files {
        current_file += 1;
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let storage = env
            .storage
            .make_storage(uri)
            .await
            .map_err(|e| ImportError::from(e).with_uri(uri))?;
        let raw = storage
            .read_file()
            .await
            .map_err(|e| ImportError::from(e).with_uri(uri))?;

        let total = file_sizes.get(id).copied().unwrap_or(0);
        let mut input = FileReader::new(raw, total, uri, format.compression);
        let counter = input.counter();
        let mut progress = if update_from_bytes {
            FileProgress::from_bytes(counter.clone(), total_bytes, read_base, reporter.clone())
        } else {
            FileProgress::disabled()
        };

        let save_rejected =
            format.format == InputFormat::MysqlOutfile && format.save_rejected;
        if save_rejected {
            let (rejected_tx, rejected_rx) = mpsc::channel(1);
            // The sink must be running before the parser's first send.
            let sink = tokio::spawn(write_rejected_rows(
                rejected_rx,
                uri.clone(),
                env.storage.clone(),
            ));
            let parsed = parser
                .read_file(&mut input, *id, uri, &mut progress, Some(rejected_tx))
                .await;
            let sink_result = sink.await?;
            parsed.map_err(|e| e.with_uri(uri))?;
            sink_result.map_err(|e| e.with_uri(uri))?;
        } else {
            parser
                .read_file(&mut input, *id, uri, &mut progress, None)
                .await
                .map_err(|e| e.with_uri(uri))?;
        }

        read_base += counter.get();
        debug!(slot = *id, "finished input file");

        if !update_from_bytes {
            reporter
                .report(current_file as f32 / files.len() as f32)
                .await?;
        }
    }
    Ok(())
}

/// Collect rejected rows and persist them next to the source file.
///
/// Runs as a sibling of the parser; the parser owns the only sender, so
/// the channel closes when it returns on any path. Writes nothing when
/// no rows were rejected.
async fn write_rejected_rows(
    mut rejected_rx: mpsc::Receiver<String>,
    uri: String,
    storage: Arc<dyn StorageFactory>,
) -> Result<(), ImportError> {
    let mut buf = Vec::new();
    let mut any = false;
    while let Some(row) = rejected_rx.recv().await {
        buf.extend_from_slice(row.as_bytes());
        any = true;
    }
    if !any {
        return Ok(());
    }
    let dest_uri = rejected_uri(&uri)?;
    let dest = storage.make_storage(&dest_uri).await?;
    dest.write_file(Bytes::from(buf)).await?;
    debug!("wrote rejected rows");
    Ok(())
}

/// Append `.rejected` to the path component of a URI.
fn rejected_uri(uri: &str) -> Result<String, ImportError> {
    if !uri.contains("://") {
        return Ok(format!("{uri}.rejected"));
    }
    let mut parsed = Url::parse(uri)
        .map_err(|source| crate::error::StorageError::InvalidUri { source })
        .map_err(ImportError::from)?;
    let path = format!("{}.rejected", parsed.path());
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_uri_bare_path() {
        assert_eq!(
            rejected_uri("/data/part1.csv").unwrap(),
            "/data/part1.csv.rejected"
        );
    }

    #[test]
    fn test_rejected_uri_keeps_query() {
        assert_eq!(
            rejected_uri("mem://bucket/part1.csv?sig=abc").unwrap(),
            "mem://bucket/part1.csv.rejected?sig=abc"
        );
    }
}
