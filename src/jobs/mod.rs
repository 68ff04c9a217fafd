//! Ingestion job queue with a polled status surface.
//!
//! Jobs are independent; no ordering holds between them. A job runs at
//! most once: a failure is recorded on the status surface and never
//! retried here. Callers that stop polling simply abandon the result;
//! the job still runs to completion and its state stays retrievable
//! until pruned.

pub mod pool;

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};

pub use pool::WorkerPool;

use crate::ingest::IngestOutcome;

/// Unique identifier for a queued ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

impl JobId {
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        JobId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// One image waiting to be ingested. The bytes already live in object
/// storage; the job carries only the locator.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub filename: String,
    pub locator: String,
    pub listing_id: Option<i64>,
}

/// Job lifecycle as exposed to pollers.
#[derive(Debug, Clone)]
pub enum JobState {
    Pending,
    InProgress,
    Succeeded(IngestOutcome),
    Failed { kind: &'static str, error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded(_) | JobState::Failed { .. })
    }
}

struct QueueInner {
    pending: VecDeque<(JobId, IngestJob)>,
    statuses: HashMap<JobId, JobState>,
    shutdown: bool,
}

/// FIFO queue shared between submitters and the worker pool.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                statuses: HashMap::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue a job and return its id for polling.
    pub fn submit(&self, job: IngestJob) -> JobId {
        let id = JobId::new();
        let mut inner = self.inner.lock().unwrap();
        inner.statuses.insert(id, JobState::Pending);
        inner.pending.push_back((id, job));
        drop(inner);
        self.available.notify_one();
        id
    }

    /// Current state of a job, or `None` for an unknown/pruned id.
    pub fn status(&self, id: JobId) -> Option<JobState> {
        self.inner.lock().unwrap().statuses.get(&id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Block until a job is available, marking it in-progress. Returns
    /// `None` once the queue is shut down and drained.
    fn next_job(&self) -> Option<(JobId, IngestJob)> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some((id, job)) = inner.pending.pop_front() {
                inner.statuses.insert(id, JobState::InProgress);
                return Some((id, job));
            }
            if inner.shutdown {
                return None;
            }
            inner = self.available.wait(inner).unwrap();
        }
    }

    fn complete(&self, id: JobId, state: JobState) {
        self.inner.lock().unwrap().statuses.insert(id, state);
    }

    /// Drop terminal results, returning how many were removed. Pending
    /// and in-progress jobs are untouched.
    pub fn prune_finished(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.statuses.len();
        inner.statuses.retain(|_, state| !state.is_terminal());
        before - inner.statuses.len()
    }

    /// Stop accepting blocking waits; queued jobs still drain first.
    pub fn shutdown(&self) {
        self.inner.lock().unwrap().shutdown = true;
        self.available.notify_all();
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> IngestJob {
        IngestJob {
            filename: name.to_string(),
            locator: format!("fs://{name}"),
            listing_id: None,
        }
    }

    #[test]
    fn submit_sets_pending_and_preserves_fifo_order() {
        let queue = JobQueue::new();
        let a = queue.submit(job("a.jpg"));
        let b = queue.submit(job("b.jpg"));

        assert!(matches!(queue.status(a), Some(JobState::Pending)));
        assert_eq!(queue.pending_count(), 2);

        let (first, _) = queue.next_job().unwrap();
        assert_eq!(first, a);
        assert!(matches!(queue.status(a), Some(JobState::InProgress)));

        let (second, _) = queue.next_job().unwrap();
        assert_eq!(second, b);
    }

    #[test]
    fn unknown_id_has_no_status() {
        let queue = JobQueue::new();
        assert!(queue.status(JobId(999_999)).is_none());
    }

    #[test]
    fn prune_drops_only_terminal_states() {
        let queue = JobQueue::new();
        let done = queue.submit(job("done.jpg"));
        let waiting = queue.submit(job("waiting.jpg"));

        let (id, _) = queue.next_job().unwrap();
        assert_eq!(id, done);
        queue.complete(
            done,
            JobState::Failed {
                kind: "inference",
                error: "model service unavailable".to_string(),
            },
        );

        assert_eq!(queue.prune_finished(), 1);
        assert!(queue.status(done).is_none());
        assert!(matches!(queue.status(waiting), Some(JobState::Pending)));
    }

    #[test]
    fn shutdown_unblocks_after_drain() {
        let queue = std::sync::Arc::new(JobQueue::new());
        queue.submit(job("last.jpg"));
        queue.shutdown();

        // The queued job still drains before the queue reports empty
        assert!(queue.next_job().is_some());
        assert!(queue.next_job().is_none());
    }
}
