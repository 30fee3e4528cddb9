//! The input-converter seam and read-progress reporting.
//!
//! Converters own the producing half of the KV channel: they parse a
//! format dialect into [`KvBatch`]es and close the channel exactly once
//! via [`InputConverter::input_finished`]. The format-specific parsers
//! live in the embedding system; this crate supplies the file-set
//! reading machinery they drive (see [`crate::source`]).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::env::ImportEnv;
use crate::error::ImportError;
use crate::job::{Job, ProgressDetails};
use crate::kv::KvBatch;
use crate::spec::{FileFormat, ImportSpec};

/// Receives the fraction of input consumed so far, in [0, 1].
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, fraction: f32) -> Result<(), ImportError>;
}

/// A reporter that discards every update.
pub struct NoopReporter;

#[async_trait]
impl ProgressReporter for NoopReporter {
    async fn report(&self, _fraction: f32) -> Result<(), ImportError> {
        Ok(())
    }
}

/// Writes read progress into the owning job's per-slot fraction array.
///
/// Under direct ingest the ingestor owns progress, so reads report
/// nothing here.
pub struct FractionReporter {
    job: Arc<dyn Job>,
    slot: usize,
    contribution: f32,
    ingest_directly: bool,
}

impl FractionReporter {
    pub fn new(job: Arc<dyn Job>, spec: &ImportSpec) -> Self {
        Self {
            job,
            slot: spec.progress.slot,
            contribution: spec.progress.contribution,
            ingest_directly: spec.ingest_directly,
        }
    }
}

#[async_trait]
impl ProgressReporter for FractionReporter {
    async fn report(&self, fraction: f32) -> Result<(), ImportError> {
        if self.ingest_directly {
            return Ok(());
        }
        if !matches!(self.job.progress().details, ProgressDetails::Import(_)) {
            return Err(ImportError::UnexpectedProgress);
        }
        let slot = self.slot;
        let slot_fraction = fraction * self.contribution;
        self.job
            .fraction_progressed(Box::new(move |details| match details {
                ProgressDetails::Import(import) => {
                    if !import.sampling_progress.is_empty() {
                        if import.sampling_progress.len() <= slot {
                            import.sampling_progress.resize(slot + 1, 0.0);
                        }
                        import.sampling_progress[slot] = slot_fraction;
                    } else {
                        if import.read_progress.len() <= slot {
                            import.read_progress.resize(slot + 1, 0.0);
                        }
                        import.read_progress[slot] = slot_fraction;
                    }
                    import.completed()
                }
                ProgressDetails::Other => 0.0,
            }))
            .await?;
        Ok(())
    }
}

/// A format converter: consumes decompressed file streams, emits KV
/// batches on the channel it was constructed with.
#[async_trait]
pub trait InputConverter: Send {
    /// Register any converter-internal background tasks (parser worker
    /// pools and the like) within the orchestrator's task group.
    fn start(
        &mut self,
        _tasks: &mut JoinSet<Result<(), ImportError>>,
        _cancel: &CancellationToken,
    ) {
    }

    /// Drive file-set reading until every input file is parsed or an
    /// error occurs.
    async fn read_files(
        &mut self,
        cancel: CancellationToken,
        env: &ImportEnv,
        files: &HashMap<i32, String>,
        format: &FileFormat,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<(), ImportError>;

    /// Signal end of input: flush pending batches and close the KV
    /// channel. Invoked on both success and failure, exactly once.
    async fn input_finished(&mut self);
}

/// Dispatches an import spec to a converter for its format dialect.
pub trait ConverterFactory: Send + Sync {
    fn make_input_converter(
        &self,
        spec: &ImportSpec,
        kv_tx: mpsc::Sender<KvBatch>,
    ) -> Result<Box<dyn InputConverter>, ImportError>;
}
