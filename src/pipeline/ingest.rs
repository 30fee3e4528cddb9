//! Direct ingestion: drain the KV channel into the dual bulk adders and
//! track per-file resume watermarks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adder::{BulkAdder, BulkAdderOptions, BulkOpSummary};
use crate::env::ImportEnv;
use crate::error::{AdderError, ImportError};
use crate::kv::{self, KvBatch, PRIMARY_INDEX_ID};
use crate::output::BulkProgress;
use crate::spec::ImportSpec;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Per-file ingest watermarks.
///
/// `written_row` is written by the ingest task only; the adder flush
/// hooks and the progress reporter read every slot through atomics, so
/// the contract is atomic-per-element with no cross-element consistency.
pub struct IngestProgress {
    written_row: Vec<AtomicU64>,
    written_fraction: Vec<AtomicU32>,
    pk_flushed_row: Vec<AtomicU64>,
    idx_flushed_row: Vec<AtomicU64>,
}

impl IngestProgress {
    pub fn new(files: usize) -> Self {
        Self {
            written_row: (0..files).map(|_| AtomicU64::new(0)).collect(),
            written_fraction: (0..files).map(|_| AtomicU32::new(0)).collect(),
            pk_flushed_row: (0..files).map(|_| AtomicU64::new(0)).collect(),
            idx_flushed_row: (0..files).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Record a routed batch. Called from the ingest task only.
    pub fn note_batch(&self, offset: usize, last_row: u64, fraction: f32) {
        self.written_row[offset].store(last_row, Ordering::Relaxed);
        self.written_fraction[offset].store(fraction.to_bits(), Ordering::Relaxed);
    }

    /// PK flush hook: everything written has been persisted by the PK
    /// adder. If the secondary adder is empty, nothing pending there can
    /// flush later either, so its watermark advances too.
    pub fn on_pk_flush(&self, index_adder_empty: bool) {
        for offset in 0..self.written_row.len() {
            let row = self.written_row[offset].load(Ordering::Relaxed);
            self.pk_flushed_row[offset].store(row, Ordering::Relaxed);
            if index_adder_empty {
                self.idx_flushed_row[offset].store(row, Ordering::Relaxed);
            }
        }
    }

    /// Secondary-adder flush hook.
    pub fn on_idx_flush(&self) {
        for offset in 0..self.written_row.len() {
            let row = self.written_row[offset].load(Ordering::Relaxed);
            self.idx_flushed_row[offset].store(row, Ordering::Relaxed);
        }
    }

    /// Snapshot a progress record. On resume we can skip up to the last
    /// row for which both adders have flushed KVs.
    pub fn snapshot(&self, offsets: &HashMap<i32, usize>) -> BulkProgress {
        let mut prog = BulkProgress::default();
        for (file, offset) in offsets {
            let pk = self.pk_flushed_row[*offset].load(Ordering::Relaxed);
            let idx = self.idx_flushed_row[*offset].load(Ordering::Relaxed);
            prog.completed_row.insert(*file, pk.min(idx));
            prog.completed_fraction.insert(
                *file,
                f32::from_bits(self.written_fraction[*offset].load(Ordering::Relaxed)),
            );
        }
        prog
    }
}

fn wrap_adder_err(err: AdderError, index: &str) -> ImportError {
    if err.is_duplicate() {
        ImportError::DuplicateKey {
            index: index.to_string(),
            source: err,
        }
    } else {
        ImportError::Adder { source: err }
    }
}

/// Drain the KV channel into the adders until it closes, then flush both
/// and return the combined summary.
///
/// Two adders are used because a single adder receiving interleaved
/// primary and secondary KVs flushes many tiny SSTs: the secondary
/// stream fills buffers slowly. The secondary adder is buffered larger
/// than the PK adder (see [`crate::config::Settings`]), which keeps the
/// L0 file count down while bounding memory. The caller is expected to
/// have pre-split ranges at every index-span boundary, so the adders'
/// SSTs avoid worst-case AddSSTable overlap.
pub async fn ingest_kvs(
    env: &ImportEnv,
    spec: &ImportSpec,
    prog_tx: mpsc::Sender<BulkProgress>,
    kv_rx: mpsc::Receiver<KvBatch>,
    cancel: CancellationToken,
) -> Result<BulkOpSummary, ImportError> {
    let flush_size = env.settings.max_import_batch_size;

    let pk_sizes = env.settings.import_buffer_config_sizes(true);
    let pk_adder = env.adders.make_adder(BulkAdderOptions {
        name: "pkAdder".to_string(),
        disallow_shadowing: true,
        skip_duplicates: true,
        min_buffer_size: pk_sizes.min,
        max_buffer_size: pk_sizes.max,
        step_buffer_size: pk_sizes.step,
        sst_size: flush_size,
        write_timestamp_nanos: spec.walltime_nanos,
    })?;

    let idx_sizes = env.settings.import_buffer_config_sizes(false);
    let index_adder = match env.adders.make_adder(BulkAdderOptions {
        name: "indexAdder".to_string(),
        disallow_shadowing: true,
        skip_duplicates: true,
        min_buffer_size: idx_sizes.min,
        max_buffer_size: idx_sizes.max,
        step_buffer_size: idx_sizes.step,
        sst_size: flush_size,
        write_timestamp_nanos: spec.walltime_nanos,
    }) {
        Ok(adder) => adder,
        Err(err) => {
            pk_adder.close().await;
            return Err(err.into());
        }
    };

    let result = run_adders(
        spec,
        prog_tx,
        kv_rx,
        cancel,
        pk_adder.clone(),
        index_adder.clone(),
    )
    .await;

    // Both adders are closed on every exit path, including error and
    // cancellation.
    pk_adder.close().await;
    index_adder.close().await;
    result
}

async fn run_adders(
    spec: &ImportSpec,
    prog_tx: mpsc::Sender<BulkProgress>,
    mut kv_rx: mpsc::Receiver<KvBatch>,
    cancel: CancellationToken,
    pk_adder: Arc<dyn BulkAdder>,
    index_adder: Arc<dyn BulkAdder>,
) -> Result<BulkOpSummary, ImportError> {
    let progress = Arc::new(IngestProgress::new(spec.uris.len()));

    // offsets maps input file slot ids to positions in the progress
    // arrays.
    let offsets: HashMap<i32, usize> = spec
        .uris
        .keys()
        .enumerate()
        .map(|(offset, id)| (*id, offset))
        .collect();

    {
        let hook_progress = progress.clone();
        let hook_index_adder = index_adder.clone();
        pk_adder.set_on_flush(Box::new(move || {
            hook_progress.on_pk_flush(hook_index_adder.is_empty());
        }));
    }
    {
        let hook_progress = progress.clone();
        index_adder.set_on_flush(Box::new(move || hook_progress.on_idx_flush()));
    }

    // stop_progress is cancelled exactly once, by the ingest loop, when
    // there is no more progress to report.
    let stop_progress = CancellationToken::new();
    let reporter = tokio::spawn(report_progress(
        progress.clone(),
        offsets.clone(),
        prog_tx,
        stop_progress.clone(),
        cancel.clone(),
    ));

    let ingest_result = async {
        loop {
            let batch = tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(ImportError::Cancelled),

                batch = kv_rx.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };

            for pair in &batch.kvs {
                // Route by the key's index id.
                let (_, index_id) = kv::decode_table_index_prefix(&pair.key)?;
                if index_id == PRIMARY_INDEX_ID {
                    if let Err(err) = pk_adder.add(pair.key.clone(), pair.value.clone()).await {
                        return Err(wrap_adder_err(err, "primary index"));
                    }
                } else if let Err(err) =
                    index_adder.add(pair.key.clone(), pair.value.clone()).await
                {
                    return Err(wrap_adder_err(err, "index"));
                }
            }

            let Some(&offset) = offsets.get(&batch.source) else {
                return Err(ImportError::Converter {
                    message: format!("batch from unknown source slot {}", batch.source),
                });
            };
            progress.note_batch(offset, batch.last_row, batch.progress);
        }
        Ok(())
    }
    .await;

    stop_progress.cancel();
    let reporter_result = reporter.await?;
    ingest_result?;
    reporter_result?;

    debug!("kv channel drained; flushing adders");
    if let Err(err) = pk_adder.flush().await {
        return Err(wrap_adder_err(err, "primary index"));
    }
    if let Err(err) = index_adder.flush().await {
        return Err(wrap_adder_err(err, "index"));
    }

    let mut summary = pk_adder.summary();
    summary.add(&index_adder.summary());
    Ok(summary)
}

/// Push a progress record every [`PROGRESS_INTERVAL`] until stopped.
async fn report_progress(
    progress: Arc<IngestProgress>,
    offsets: HashMap<i32, usize>,
    prog_tx: mpsc::Sender<BulkProgress>,
    stop_progress: CancellationToken,
    cancel: CancellationToken,
) -> Result<(), ImportError> {
    let mut tick = interval_at(Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ImportError::Cancelled),

            _ = stop_progress.cancelled() => return Ok(()),

            _ = tick.tick() => {
                if prog_tx.send(progress.snapshot(&offsets)).await.is_err() {
                    return Err(ImportError::ChannelClosed);
                }
            }
        }
    }
}
