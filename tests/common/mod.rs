//! Shared test doubles for the import pipeline: an in-memory bulk adder,
//! a scripted converter, a static job registry, and a collecting row
//! receiver.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use avalanche::adder::{BulkAdder, BulkAdderFactory, BulkAdderOptions, BulkOpSummary, OnFlush};
use avalanche::config::Settings;
use avalanche::convert::{ConverterFactory, InputConverter, ProgressReporter};
use avalanche::env::ImportEnv;
use avalanche::error::{AdderError, ImportError, JobError};
use avalanche::job::{
    ImportProgress, Job, JobProgress, JobRegistry, ProgressDetails, ProgressUpdater,
};
use avalanche::kv::{self, KvBatch, KvPair, PRIMARY_INDEX_ID};
use avalanche::output::{ConsumerStatus, ProducerMetadata, Row, RowReceiver};
use avalanche::spec::{FileFormat, ImportSpec, InputFormat};
use avalanche::storage::ObjectStorageFactory;

// ============ Bulk adder ============

/// Shared, inspectable state of one [`MemoryAdder`].
#[derive(Default)]
pub struct AdderState {
    /// Every KV accepted by the adder, in add order.
    pub added: Mutex<Vec<(Bytes, Bytes)>>,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl AdderState {
    pub fn added_count(&self) -> usize {
        self.added.lock().unwrap().len()
    }
}

/// An in-memory bulk adder. Counts every accepted KV as a row in its
/// summary (and secondary-index KVs as index entries); a repeated key
/// with a different value surfaces as [`AdderError::DuplicateKey`],
/// while exact duplicates are skipped per `skip_duplicates`. Like a real
/// adder, it flushes on its own once `max_buffer_size` payload bytes are
/// buffered, firing the on-flush hook mid-stream.
pub struct MemoryAdder {
    opts: BulkAdderOptions,
    state: Arc<AdderState>,
    seen: Mutex<HashMap<Bytes, Bytes>>,
    buffered_bytes: AtomicUsize,
    summary: Mutex<BulkOpSummary>,
    on_flush: Mutex<Option<OnFlush>>,
}

impl MemoryAdder {
    fn new(opts: BulkAdderOptions, state: Arc<AdderState>) -> Self {
        Self {
            opts,
            state,
            seen: Mutex::new(HashMap::new()),
            buffered_bytes: AtomicUsize::new(0),
            summary: Mutex::new(BulkOpSummary::default()),
            on_flush: Mutex::new(None),
        }
    }
}

#[async_trait]
impl BulkAdder for MemoryAdder {
    async fn add(&self, key: Bytes, value: Bytes) -> Result<(), AdderError> {
        {
            let mut seen = self.seen.lock().unwrap();
            if let Some(existing) = seen.get(&key) {
                if *existing == value && self.opts.skip_duplicates {
                    return Ok(());
                }
                return Err(AdderError::DuplicateKey { key });
            }
            seen.insert(key.clone(), value.clone());
        }

        let (_, index_id) = kv::decode_table_index_prefix(&key)
            .map_err(|e| AdderError::Internal {
                message: e.to_string(),
            })?;
        {
            let mut summary = self.summary.lock().unwrap();
            summary.data_size += (key.len() + value.len()) as u64;
            summary.rows += 1;
            if index_id != PRIMARY_INDEX_ID {
                summary.index_entries += 1;
            }
        }
        let size = key.len() + value.len();
        self.state.added.lock().unwrap().push((key, value));
        let buffered = self.buffered_bytes.fetch_add(size, Ordering::SeqCst) + size;
        if buffered as u64 >= self.opts.max_buffer_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), AdderError> {
        self.buffered_bytes.store(0, Ordering::SeqCst);
        self.state.flushes.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_flush.lock().unwrap().as_ref() {
            hook();
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.buffered_bytes.load(Ordering::SeqCst) == 0
    }

    fn set_on_flush(&self, hook: OnFlush) {
        *self.on_flush.lock().unwrap() = Some(hook);
    }

    fn summary(&self) -> BulkOpSummary {
        *self.summary.lock().unwrap()
    }

    async fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out [`MemoryAdder`]s and keeps their states addressable by
/// adder name ("pkAdder" / "indexAdder").
#[derive(Default)]
pub struct MemoryAdderFactory {
    states: Mutex<HashMap<String, Arc<AdderState>>>,
}

impl MemoryAdderFactory {
    pub fn state(&self, name: &str) -> Arc<AdderState> {
        self.states
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

impl BulkAdderFactory for MemoryAdderFactory {
    fn make_adder(&self, opts: BulkAdderOptions) -> Result<Arc<dyn BulkAdder>, AdderError> {
        let state = self.state(&opts.name);
        Ok(Arc::new(MemoryAdder::new(opts, state)))
    }
}

// ============ Job registry ============

/// A single job whose progress details live in memory.
pub struct StaticJob {
    pub details: Mutex<ProgressDetails>,
    /// Overall fractions recorded through `fraction_progressed`.
    pub fractions: Mutex<Vec<f32>>,
}

impl StaticJob {
    pub fn import(progress: ImportProgress) -> Arc<Self> {
        Arc::new(Self {
            details: Mutex::new(ProgressDetails::Import(progress)),
            fractions: Mutex::new(Vec::new()),
        })
    }

    pub fn other() -> Arc<Self> {
        Arc::new(Self {
            details: Mutex::new(ProgressDetails::Other),
            fractions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Job for StaticJob {
    fn progress(&self) -> JobProgress {
        JobProgress {
            details: self.details.lock().unwrap().clone(),
        }
    }

    async fn fraction_progressed(&self, update: ProgressUpdater) -> Result<(), JobError> {
        let mut details = self.details.lock().unwrap();
        let completed = update(&mut details);
        self.fractions.lock().unwrap().push(completed);
        Ok(())
    }
}

pub struct StaticJobRegistry {
    pub job: Arc<StaticJob>,
}

#[async_trait]
impl JobRegistry for StaticJobRegistry {
    async fn load_job(&self, _id: u64) -> Result<Arc<dyn Job>, JobError> {
        Ok(self.job.clone())
    }
}

// ============ Row receiver ============

/// Collects every pushed row and metadata record. `close_after` makes
/// the receiver report itself closed once that many rows arrived.
#[derive(Default)]
pub struct CollectingReceiver {
    pub rows: Mutex<Vec<Row>>,
    pub metas: Mutex<Vec<ProducerMetadata>>,
    pub close_after: Option<usize>,
}

impl CollectingReceiver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn closing_after(rows: usize) -> Arc<Self> {
        Arc::new(Self {
            close_after: Some(rows),
            ..Self::default()
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl RowReceiver for CollectingReceiver {
    async fn push(&self, row: Option<Row>, meta: Option<ProducerMetadata>) -> ConsumerStatus {
        if let Some(row) = row {
            let mut rows = self.rows.lock().unwrap();
            rows.push(row);
            if let Some(limit) = self.close_after {
                if rows.len() >= limit {
                    return ConsumerStatus::ConsumerClosed;
                }
            }
        }
        if let Some(meta) = meta {
            self.metas.lock().unwrap().push(meta);
        }
        ConsumerStatus::NeedMoreRows
    }
}

// ============ Converter ============

/// A converter that replays a scripted batch sequence onto the KV
/// channel, optionally sleeping between batches, or emitting forever.
pub struct ScriptedConverter {
    batches: Vec<KvBatch>,
    delay_between_batches: Option<Duration>,
    endless: bool,
    kv_tx: Option<mpsc::Sender<KvBatch>>,
}

#[async_trait]
impl InputConverter for ScriptedConverter {
    async fn read_files(
        &mut self,
        cancel: CancellationToken,
        _env: &ImportEnv,
        _files: &HashMap<i32, String>,
        _format: &FileFormat,
        _reporter: Arc<dyn ProgressReporter>,
    ) -> Result<(), ImportError> {
        let Some(tx) = self.kv_tx.clone() else {
            return Err(ImportError::ChannelClosed);
        };
        for batch in self.batches.drain(..) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                sent = tx.send(batch) => {
                    if sent.is_err() {
                        // Consumer is gone; its error is the real one.
                        return Ok(());
                    }
                }
            }
            if let Some(delay) = self.delay_between_batches {
                tokio::time::sleep(delay).await;
            }
        }
        while self.endless {
            let batch = KvBatch {
                source: 0,
                last_row: 0,
                progress: 0.0,
                kvs: vec![pk_kv(0)],
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                sent = tx.send(batch) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    async fn input_finished(&mut self) {
        self.kv_tx.take();
    }
}

#[derive(Default)]
pub struct ScriptedConverterFactory {
    batches: Mutex<Vec<KvBatch>>,
    delay_between_batches: Option<Duration>,
    endless: bool,
}

impl ScriptedConverterFactory {
    pub fn new(batches: Vec<KvBatch>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches),
            delay_between_batches: None,
            endless: false,
        })
    }

    pub fn with_delay(batches: Vec<KvBatch>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches),
            delay_between_batches: Some(delay),
            endless: false,
        })
    }

    pub fn endless() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            delay_between_batches: None,
            endless: true,
        })
    }
}

impl ConverterFactory for ScriptedConverterFactory {
    fn make_input_converter(
        &self,
        _spec: &ImportSpec,
        kv_tx: mpsc::Sender<KvBatch>,
    ) -> Result<Box<dyn InputConverter>, ImportError> {
        Ok(Box::new(ScriptedConverter {
            batches: std::mem::take(&mut *self.batches.lock().unwrap()),
            delay_between_batches: self.delay_between_batches,
            endless: self.endless,
            kv_tx: Some(kv_tx),
        }))
    }
}

/// A converter factory for tests that never construct a converter.
pub struct UnusedConverterFactory;

impl ConverterFactory for UnusedConverterFactory {
    fn make_input_converter(
        &self,
        _spec: &ImportSpec,
        _kv_tx: mpsc::Sender<KvBatch>,
    ) -> Result<Box<dyn InputConverter>, ImportError> {
        Err(ImportError::Converter {
            message: "no converter in this test".to_string(),
        })
    }
}

// ============ Environment and spec helpers ============

pub struct TestEnv {
    pub env: ImportEnv,
    pub adders: Arc<MemoryAdderFactory>,
    pub job: Arc<StaticJob>,
    pub storage: Arc<ObjectStorageFactory>,
}

/// Build an env around the given converter factory, with memory adders,
/// a fresh storage factory, and an import job with empty progress.
pub fn test_env(converters: Arc<dyn ConverterFactory>) -> TestEnv {
    test_env_with_job(converters, StaticJob::import(ImportProgress::default()))
}

/// Same, with custom settings (e.g. tiny adder buffers to force
/// mid-stream flushes).
pub fn test_env_with_settings(
    converters: Arc<dyn ConverterFactory>,
    settings: Settings,
) -> TestEnv {
    let mut harness = test_env(converters);
    harness.env.settings = Arc::new(settings);
    harness
}

pub fn test_env_with_job(
    converters: Arc<dyn ConverterFactory>,
    job: Arc<StaticJob>,
) -> TestEnv {
    let adders = Arc::new(MemoryAdderFactory::default());
    let storage = Arc::new(ObjectStorageFactory::new());
    let env = ImportEnv {
        settings: Arc::new(Settings::default()),
        storage: storage.clone(),
        jobs: Arc::new(StaticJobRegistry { job: job.clone() }),
        adders: adders.clone(),
        converters,
    };
    TestEnv {
        env,
        adders,
        job,
        storage,
    }
}

/// A spec over `files` slot/URI pairs.
pub fn test_spec(files: &[(i32, &str)], ingest_directly: bool) -> ImportSpec {
    ImportSpec {
        uris: files
            .iter()
            .map(|(id, uri)| (*id, uri.to_string()))
            .collect(),
        format: FileFormat::new(InputFormat::Csv),
        walltime_nanos: 1,
        sample_size: 0,
        sample_seed: Some(42),
        ingest_directly,
        progress: Default::default(),
    }
}

/// A primary-index KV for row `i` of table 53.
pub fn pk_kv(i: u64) -> KvPair {
    KvPair::new(
        kv::make_key(53, PRIMARY_INDEX_ID, &i.to_be_bytes()),
        Bytes::from(format!("row-{i}")),
    )
}

/// A secondary-index KV for row `i` of table 53.
pub fn idx_kv(i: u64) -> KvPair {
    KvPair::new(
        kv::make_key(53, 2, &i.to_be_bytes()),
        Bytes::from(format!("idx-{i}")),
    )
}

pub fn batch(source: i32, last_row: u64, progress: f32, kvs: Vec<KvPair>) -> KvBatch {
    KvBatch {
        source,
        last_row,
        progress,
        kvs,
    }
}
