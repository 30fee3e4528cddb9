//! The processor wrapper around [`run_import`]: forwards progress
//! records upstream as metadata and finishes with either an error record
//! or the serialized summary row.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::env::ImportEnv;
use crate::error::ImportError;
use crate::output::{ProducerMetadata, Row, RowReceiver};
use crate::pipeline::run_import;
use crate::spec::ImportSpec;

/// Runs one import spec and streams its results to a row receiver.
pub struct ImportProcessor {
    env: ImportEnv,
    spec: Arc<ImportSpec>,
    output: Arc<dyn RowReceiver>,
}

impl ImportProcessor {
    pub fn new(env: ImportEnv, spec: ImportSpec, output: Arc<dyn RowReceiver>) -> Self {
        Self {
            env,
            spec: Arc::new(spec),
            output,
        }
    }

    /// Run the import. Progress records are pushed upstream as metadata
    /// while the pipeline runs; on completion the output receives either
    /// an error record or, in direct-ingest mode, one final row carrying
    /// the serialized [`crate::adder::BulkOpSummary`].
    pub async fn run(self, cancel: CancellationToken) {
        let (prog_tx, mut prog_rx) = mpsc::channel(1);

        // The import holds the only sender, so this loop ends when the
        // pipeline does.
        let import = tokio::spawn(run_import(
            self.env.clone(),
            self.spec.clone(),
            cancel,
            prog_tx,
            self.output.clone(),
        ));
        while let Some(prog) = prog_rx.recv().await {
            self.output
                .push(None, Some(ProducerMetadata::Progress(prog)))
                .await;
        }

        let result = match import.await {
            Ok(result) => result,
            Err(join_err) => Err(ImportError::from(join_err)),
        };
        match result {
            Err(err) => {
                self.output
                    .push(None, Some(ProducerMetadata::Error(err.to_string())))
                    .await;
            }
            Ok(None) => {}
            Ok(Some(summary)) => match serde_json::to_vec(&summary) {
                Ok(encoded) => {
                    debug!(rows = summary.rows, "import complete");
                    self.output
                        .push(Some(Row::new(encoded, Bytes::new())), None)
                        .await;
                }
                Err(err) => {
                    self.output
                        .push(None, Some(ProducerMetadata::Error(err.to_string())))
                        .await;
                }
            },
        }
    }
}
