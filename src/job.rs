//! The job registry seam and the persisted import-progress layout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::JobError;
use crate::span::KeySpan;

/// Persisted progress for an import job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportProgress {
    /// Key spans fully persisted by previous attempts; KVs inside them
    /// are dropped on resume.
    #[serde(default)]
    pub span_progress: Vec<KeySpan>,
    /// Per-slot fraction while sampling, exclusive with `read_progress`.
    #[serde(default)]
    pub sampling_progress: Vec<f32>,
    /// Per-slot fraction while reading.
    #[serde(default)]
    pub read_progress: Vec<f32>,
}

impl ImportProgress {
    /// Overall completed fraction across slots.
    pub fn completed(&self) -> f32 {
        let slots = if self.sampling_progress.is_empty() {
            &self.read_progress
        } else {
            &self.sampling_progress
        };
        if slots.is_empty() {
            return 0.0;
        }
        slots.iter().sum::<f32>() / slots.len() as f32
    }
}

/// The tagged union of per-job-kind progress payloads. The registry
/// serves many job kinds; this pipeline only understands `Import` and
/// treats anything else as an assertion failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressDetails {
    Import(ImportProgress),
    Other,
}

/// A job's progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub details: ProgressDetails,
}

/// Mutates the progress details in place and returns the job's overall
/// completed fraction.
pub type ProgressUpdater = Box<dyn FnOnce(&mut ProgressDetails) -> f32 + Send>;

/// A loaded job.
#[async_trait]
pub trait Job: Send + Sync {
    /// The job's current progress record.
    fn progress(&self) -> JobProgress;

    /// Apply `update` to the progress details and persist the returned
    /// overall fraction.
    async fn fraction_progressed(&self, update: ProgressUpdater) -> Result<(), JobError>;
}

/// The registry of running jobs.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    async fn load_job(&self, id: u64) -> Result<Arc<dyn Job>, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_prefers_sampling() {
        let progress = ImportProgress {
            span_progress: Vec::new(),
            sampling_progress: vec![0.5, 1.0],
            read_progress: vec![0.0],
        };
        assert!((progress.completed() - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_completed_falls_back_to_read() {
        let progress = ImportProgress {
            span_progress: Vec::new(),
            sampling_progress: Vec::new(),
            read_progress: vec![0.25, 0.75],
        };
        assert!((progress.completed() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_completed_empty_is_zero() {
        assert_eq!(ImportProgress::default().completed(), 0.0);
    }
}
