//! The import pipeline orchestrator.
//!
//! One import runs as a group of tasks tied to a single cancellation
//! scope: the converter's background tasks, the file reader, and either
//! the sampler or the direct ingestor, all communicating over a bounded
//! KV channel. The channel bound is the pipeline's backpressure: a slow
//! ingestor blocks the converter, which blocks the reader, which blocks
//! storage reads.

pub mod emit;
pub mod ingest;
mod processor;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adder::BulkOpSummary;
use crate::convert::{FractionReporter, ProgressReporter};
use crate::env::ImportEnv;
use crate::error::ImportError;
use crate::output::{BulkProgress, RowReceiver};
use crate::spec::ImportSpec;

pub use emit::emit_kvs;
pub use ingest::{IngestProgress, ingest_kvs};
pub use processor::ImportProcessor;

/// KV batches buffered between the converter and its consumer.
const KV_CHANNEL_CAPACITY: usize = 10;

/// Run one import to completion.
///
/// In direct-ingest mode the combined adder summary is returned and a
/// final `{fraction: 1.0, row: u64::MAX}` record is sent on `prog_tx`;
/// in sampling mode the result is `None` and sampled rows go to
/// `output`. The first task error cancels all peers through `cancel`
/// and is returned once every task has stopped.
pub async fn run_import(
    env: ImportEnv,
    spec: Arc<ImportSpec>,
    cancel: CancellationToken,
    prog_tx: mpsc::Sender<BulkProgress>,
    output: Arc<dyn RowReceiver>,
) -> Result<Option<BulkOpSummary>, ImportError> {
    let (kv_tx, kv_rx) = mpsc::channel(KV_CHANNEL_CAPACITY);
    let mut converter = env.converters.make_input_converter(&spec, kv_tx)?;

    let mut tasks: JoinSet<Result<(), ImportError>> = JoinSet::new();
    converter.start(&mut tasks, &cancel);

    // Reader: drive the converter through every input file, then signal
    // end of input. input_finished closes the KV channel from the
    // converter side on success and failure alike, draining downstream.
    {
        let env = env.clone();
        let spec = spec.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let result = async {
                let job = env.jobs.load_job(spec.progress.job_id).await?;
                let reporter: Arc<dyn ProgressReporter> =
                    Arc::new(FractionReporter::new(job, &spec));
                converter
                    .read_files(cancel.clone(), &env, &spec.uris, &spec.format, reporter)
                    .await
            }
            .await;
            converter.input_finished().await;
            result
        });
    }

    let (summary_tx, mut summary_rx) = oneshot::channel();
    if spec.ingest_directly {
        let env = env.clone();
        let spec = spec.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let summary = ingest::ingest_kvs(&env, &spec, prog_tx.clone(), kv_rx, cancel).await?;

            // Everything ingested and flushed: report completion for
            // every file.
            let mut prog = BulkProgress::default();
            for id in spec.uris.keys() {
                prog.completed_fraction.insert(*id, 1.0);
                prog.completed_row.insert(*id, u64::MAX);
            }
            if prog_tx.send(prog).await.is_err() {
                return Err(ImportError::ChannelClosed);
            }

            let _ = summary_tx.send(summary);
            Ok(())
        });
    } else {
        let env = env.clone();
        let spec = spec.clone();
        let cancel = cancel.clone();
        let output = output.clone();
        tasks.spawn(async move { emit::emit_kvs(&env, &spec, kv_rx, output, cancel).await });
    }

    // Wait for every task; the first error cancels the rest.
    let mut first_err: Option<ImportError> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(join_err) => Err(ImportError::from(join_err)),
        };
        if let Err(err) = result {
            if first_err.is_none() {
                debug!(error = %err, "import task failed; cancelling peers");
                cancel.cancel();
                first_err = Some(err);
            }
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    Ok(summary_rx.try_recv().ok())
}
