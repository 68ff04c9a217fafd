//! Worker pool draining the ingestion queue.
//!
//! Each worker opens its own store handle against the shared database
//! file. No lock is held across an inference or storage call; the queue
//! lock covers only the pop and the status write.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::aggregate::AggregationEngine;
use crate::db::Database;
use crate::error::HomelensError;
use crate::ingest::{IngestOutcome, Ingestor};
use crate::storage::ObjectStore;

use super::{IngestJob, JobQueue, JobState};

pub struct WorkerPool {
    queue: Arc<JobQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` threads draining `queue`.
    pub fn start(
        queue: Arc<JobQueue>,
        worker_count: usize,
        db_path: PathBuf,
        store: Arc<dyn ObjectStore>,
        ingestor: Arc<Ingestor>,
        aggregator: Arc<AggregationEngine>,
    ) -> Self {
        let mut handles = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let queue = queue.clone();
            let db_path = db_path.clone();
            let store = store.clone();
            let ingestor = ingestor.clone();
            let aggregator = aggregator.clone();

            handles.push(std::thread::spawn(move || {
                let db = match Database::open(&db_path) {
                    Ok(db) => db,
                    Err(e) => {
                        warn!(worker, error = %e, "worker could not open database");
                        return;
                    }
                };

                while let Some((id, job)) = queue.next_job() {
                    let state = match run_job(&db, &*store, &ingestor, &aggregator, &job) {
                        Ok(outcome) => {
                            info!(job_id = id.0, image_id = outcome.image_id, "job succeeded");
                            JobState::Succeeded(outcome)
                        }
                        Err(e) => {
                            warn!(job_id = id.0, error = %e, "job failed");
                            JobState::Failed {
                                kind: e.kind(),
                                error: e.to_string(),
                            }
                        }
                    };
                    queue.complete(id, state);
                }
            }));
        }

        Self { queue, handles }
    }

    /// Drain queued jobs, then stop and join every worker.
    pub fn shutdown(self) {
        self.queue.shutdown();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn run_job(
    db: &Database,
    store: &dyn ObjectStore,
    ingestor: &Ingestor,
    aggregator: &AggregationEngine,
    job: &IngestJob,
) -> crate::error::Result<IngestOutcome> {
    let bytes = store
        .get(&job.locator)
        .map_err(HomelensError::Persistence)?;

    let outcome = ingestor.ingest(db, &bytes, &job.filename, &job.locator, job.listing_id)?;

    // The image is committed at this point; a stale rollup corrects on
    // the next recompute, so an aggregation error does not fail the job.
    if let Some(listing_id) = job.listing_id {
        if let Err(e) = aggregator.recompute(db, listing_id) {
            warn!(listing_id, error = %e, "post-ingest aggregation failed");
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewListing;
    use crate::inference::StubModel;
    use crate::jobs::JobId;
    use crate::storage::FsStore;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn wait_terminal(queue: &JobQueue, id: JobId) -> JobState {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(state) = queue.status(id) {
                if state.is_terminal() {
                    return state;
                }
            }
            assert!(Instant::now() < deadline, "job did not finish in time");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn pool_fixture(dir: &TempDir, workers: usize) -> (Arc<JobQueue>, WorkerPool, Arc<FsStore>, Database) {
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        db.initialize().unwrap();

        let store = Arc::new(FsStore::open(dir.path().join("objects")).unwrap());
        let ingestor = Arc::new(Ingestor::new(
            Arc::new(StubModel::new(1, 768, 1536)),
            768,
            1536,
        ));
        let aggregator = Arc::new(AggregationEngine::new("v1.0", 10));
        let queue = Arc::new(JobQueue::new());
        let pool = WorkerPool::start(
            queue.clone(),
            workers,
            db_path,
            store.clone(),
            ingestor,
            aggregator,
        );
        (queue, pool, store, db)
    }

    #[test]
    fn job_runs_to_success_and_result_is_polled() {
        let dir = TempDir::new().unwrap();
        let (queue, pool, store, db) = pool_fixture(&dir, 2);

        let locator = store.put(b"jpeg bytes", "kitchen.jpg").unwrap();
        let id = queue.submit(IngestJob {
            filename: "kitchen.jpg".to_string(),
            locator,
            listing_id: None,
        });

        let state = wait_terminal(&queue, id);
        let JobState::Succeeded(outcome) = state else {
            panic!("expected success, got {state:?}");
        };
        assert!(db.get_image(outcome.image_id).unwrap().is_some());

        pool.shutdown();
    }

    #[test]
    fn failed_job_keeps_its_error_and_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let (queue, pool, _store, db) = pool_fixture(&dir, 1);

        // Locator that resolves to no object
        let id = queue.submit(IngestJob {
            filename: "ghost.jpg".to_string(),
            locator: "fs://does-not-exist".to_string(),
            listing_id: None,
        });

        let state = wait_terminal(&queue, id);
        let JobState::Failed { kind, error } = state else {
            panic!("expected failure, got {state:?}");
        };
        assert_eq!(kind, "persistence");
        assert!(!error.is_empty());
        assert_eq!(db.count_images().unwrap(), 0);

        // Still failed after a settling delay: no retry happened
        std::thread::sleep(Duration::from_millis(50));
        assert!(matches!(queue.status(id), Some(JobState::Failed { .. })));

        pool.shutdown();
    }

    #[test]
    fn success_with_listing_triggers_aggregation() {
        let dir = TempDir::new().unwrap();
        let (queue, pool, store, db) = pool_fixture(&dir, 2);

        let listing_id = db
            .create_listing(&NewListing {
                address: "77 Maple Dr".to_string(),
                ..Default::default()
            })
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            let name = format!("room{i}.jpg");
            let locator = store.put(format!("bytes {i}").as_bytes(), &name).unwrap();
            ids.push(queue.submit(IngestJob {
                filename: name,
                locator,
                listing_id: Some(listing_id),
            }));
        }
        for id in ids {
            assert!(matches!(wait_terminal(&queue, id), JobState::Succeeded(_)));
        }
        pool.shutdown();

        let agg = db.get_aggregation(listing_id).unwrap().unwrap();
        assert_eq!(agg.total_images, 3);
        assert_eq!(agg.dominant_room_type.as_deref(), Some("kitchen"));
    }

    #[test]
    fn shutdown_drains_queued_jobs() {
        let dir = TempDir::new().unwrap();
        let (queue, pool, store, db) = pool_fixture(&dir, 2);

        let mut ids = Vec::new();
        for i in 0..5 {
            let name = format!("img{i}.jpg");
            let locator = store.put(format!("raw {i}").as_bytes(), &name).unwrap();
            ids.push(queue.submit(IngestJob {
                filename: name,
                locator,
                listing_id: None,
            }));
        }

        pool.shutdown();

        for id in ids {
            assert!(matches!(
                queue.status(id),
                Some(JobState::Succeeded(_))
            ));
        }
        assert_eq!(db.count_images().unwrap(), 5);
    }
}
