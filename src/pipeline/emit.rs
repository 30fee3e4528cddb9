//! Sampling mode: forward a size-weighted subset of KVs upstream for
//! split-point planning.

use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::env::ImportEnv;
use crate::error::ImportError;
use crate::job::ProgressDetails;
use crate::kv::{self, KvBatch, KvPair};
use crate::output::{ConsumerStatus, Row, RowReceiver};
use crate::span::SpanGroup;
use crate::spec::ImportSpec;

/// Accepts a KV with probability `size / sample_size`, so larger KVs are
/// proportionally more likely to surface as split points. KVs at least
/// `sample_size` bytes are always accepted.
struct SampleRate {
    rng: StdRng,
    sample_size: f64,
}

impl SampleRate {
    fn new(sample_size: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng, sample_size }
    }

    fn sample(&mut self, pair: &KvPair) -> bool {
        let prob = pair.size() as f64 / self.sample_size;
        prob > self.rng.random::<f64>()
    }
}

/// Drain the KV channel, dropping keys inside already-completed spans
/// and forwarding the rest to the upstream receiver.
///
/// With `sample_size == 0` every KV is forwarded with its full value.
/// Otherwise only descriptor keys keep their value; sampled keys go up
/// with an empty value column.
pub async fn emit_kvs(
    env: &ImportEnv,
    spec: &ImportSpec,
    mut kv_rx: mpsc::Receiver<KvBatch>,
    output: Arc<dyn RowReceiver>,
    cancel: CancellationToken,
) -> Result<(), ImportError> {
    let sample_all = spec.sample_size == 0;
    let mut sampler =
        (!sample_all).then(|| SampleRate::new(spec.sample_size as f64, spec.sample_seed));

    // Spans persisted by earlier attempts of this import: anything
    // inside them is already ingested.
    let job = env.jobs.load_job(spec.progress.job_id).await?;
    let mut completed_spans = SpanGroup::new();
    match job.progress().details {
        ProgressDetails::Import(import) => completed_spans.add_all(import.span_progress),
        ProgressDetails::Other => return Err(ImportError::UnexpectedProgress),
    }

    loop {
        let batch = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ImportError::Cancelled),

            batch = kv_rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        for pair in batch.kvs {
            if completed_spans.contains(&pair.key) {
                continue;
            }

            let required = sample_all || kv::is_descriptor_key(&pair.key);
            let accepted = required
                || sampler
                    .as_mut()
                    .is_some_and(|sampler| sampler.sample(&pair));
            if !accepted {
                continue;
            }

            let row = if required {
                Row::new(pair.key, pair.value)
            } else {
                // Sampled rows carry no value upstream.
                Row::new(pair.key, Bytes::new())
            };
            if output.push(Some(row), None).await != ConsumerStatus::NeedMoreRows {
                return Err(ImportError::ConsumerClosed);
            }
        }
    }
    Ok(())
}
