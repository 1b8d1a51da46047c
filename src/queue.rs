//! Sequential conversion queue.
//!
//! Inputs are converted strictly one at a time, in submission order, and
//! each finished book goes straight into the [`Library`]. A failed input is
//! marked [`JobStatus::Failed`] and the queue moves on; books stored earlier
//! are never touched.
//!
//! ```text
//! push(a) push(b) push(c)
//!    │
//!    ▼
//! run() ─▶ a: Pending → Processing{5..100} → Done{id}
//!          b: Pending → Processing{5..}    → Failed{message}
//!          c: Pending → Processing{5..100} → Done{id}
//! ```

use crate::config::ConversionConfig;
use crate::convert::convert_to_library;
use crate::library::Library;
use crate::progress::{BookProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Where one input is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Processing { progress: u8 },
    Done { book_id: Uuid },
    Failed { message: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done { .. } | JobStatus::Failed { .. })
    }
}

/// One queued input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Path or URL as submitted.
    pub input: String,
    pub status: JobStatus,
}

/// A FIFO of inputs converted into a shared library.
pub struct BookQueue {
    library: Library,
    config: ConversionConfig,
    jobs: Arc<Mutex<Vec<Job>>>,
}

impl BookQueue {
    /// `config.progress_callback`, if any, still receives every progress
    /// event; the queue additionally mirrors it into the job's status.
    pub fn new(library: Library, config: ConversionConfig) -> Self {
        Self {
            library,
            config,
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue an input and return its index.
    pub fn push(&self, input: impl Into<String>) -> usize {
        let mut jobs = lock(&self.jobs);
        jobs.push(Job {
            input: input.into(),
            status: JobStatus::Pending,
        });
        jobs.len() - 1
    }

    /// Current state of every job.
    pub fn snapshot(&self) -> Vec<Job> {
        lock(&self.jobs).clone()
    }

    /// Process every pending job in order, then return the final states.
    pub async fn run(&self) -> Vec<Job> {
        while let Some((index, input)) = self.next_pending() {
            let total = lock(&self.jobs).len();
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_job_start(index + 1, total);
            }
            let mut config = self.config.clone();
            config.progress_callback = Some(Arc::new(JobProgress {
                jobs: Arc::clone(&self.jobs),
                index,
                inner: self.config.progress_callback.clone(),
            }) as ProgressCallback);

            info!("Queue: converting job {} ({})", index + 1, input);
            let status = match convert_to_library(&input, &self.library, &config).await {
                Ok((book, _stats)) => JobStatus::Done { book_id: book.id },
                Err(e) => {
                    warn!("Queue: job {} failed: {}", index + 1, e);
                    JobStatus::Failed {
                        message: e.to_string(),
                    }
                }
            };
            self.set_status(index, status);
        }
        self.snapshot()
    }

    fn next_pending(&self) -> Option<(usize, String)> {
        let mut jobs = lock(&self.jobs);
        let (index, job) = jobs
            .iter_mut()
            .enumerate()
            .find(|(_, j)| j.status == JobStatus::Pending)?;
        job.status = JobStatus::Processing { progress: 0 };
        Some((index, job.input.clone()))
    }

    fn set_status(&self, index: usize, status: JobStatus) {
        if let Some(job) = lock(&self.jobs).get_mut(index) {
            job.status = status;
        }
    }
}

/// Mirrors pipeline progress into one job's status.
struct JobProgress {
    jobs: Arc<Mutex<Vec<Job>>>,
    index: usize,
    inner: Option<ProgressCallback>,
}

impl BookProgressCallback for JobProgress {
    fn on_progress(&self, percent: u8) {
        if let Some(job) = lock(&self.jobs).get_mut(self.index) {
            job.status = JobStatus::Processing { progress: percent };
        }
        if let Some(ref cb) = self.inner {
            cb.on_progress(percent);
        }
    }

    fn on_chunk_fallback(&self, chunk: usize, total: usize, error: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_chunk_fallback(chunk, total, error);
        }
    }
}

// A panic in a progress callback must not wedge the queue.
fn lock(jobs: &Mutex<Vec<Job>>) -> MutexGuard<'_, Vec<Job>> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
