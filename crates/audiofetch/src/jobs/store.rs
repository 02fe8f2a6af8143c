use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::Utc;
use moka::sync::Cache;
use tokio::sync::broadcast;

use crate::jobs::job::Job;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

type SharedJob = Arc<RwLock<Job>>;

/// In-memory job registry.
///
/// Running jobs live in an unbounded map and never expire. When an update
/// moves a job to a terminal state it is handed to a TTL cache, so the
/// retention window starts at completion rather than at submission.
#[derive(Clone)]
pub struct JobStore {
    running: Arc<Mutex<HashMap<String, SharedJob>>>,
    finished: Cache<String, SharedJob>,
    updates: broadcast::Sender<Job>,
}

impl JobStore {
    pub fn new(retention: Duration, max_jobs: u64) -> Self {
        let finished = Cache::builder()
            .max_capacity(max_jobs)
            .time_to_live(retention)
            .build();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            running: Arc::new(Mutex::new(HashMap::new())),
            finished,
            updates,
        }
    }

    pub fn insert(&self, job: Job) {
        self.publish(&job);
        let id = job.job_id.clone();
        let finished = job.is_finished();
        let entry = Arc::new(RwLock::new(job));
        if finished {
            self.finished.insert(id, entry);
        } else {
            self.lock_running().insert(id, entry);
        }
    }

    /// Snapshot of the job, or `None` if unknown or past retention.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        let entry = self.entry(job_id)?;
        let guard = match entry.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job {} lock was poisoned, recovering", job_id);
                poisoned.into_inner()
            }
        };
        Some(guard.clone())
    }

    /// Applies `f` to the job in place and returns the new snapshot. A job
    /// that reaches a terminal state starts its retention window here.
    pub fn update<F>(&self, job_id: &str, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let entry = self.entry(job_id)?;
        let snapshot = {
            let mut guard = match entry.write() {
                Ok(g) => g,
                Err(poisoned) => {
                    log::warn!("Job {} lock was poisoned, recovering", job_id);
                    poisoned.into_inner()
                }
            };
            f(&mut *guard);
            guard.updated_at = Utc::now();
            guard.clone()
        };

        if snapshot.is_finished() {
            let mut running = self.lock_running();
            if let Some(entry) = running.get(job_id).cloned() {
                // Visible in the retention cache before it leaves the map.
                self.finished.insert(job_id.to_string(), entry);
                running.remove(job_id);
            }
        }

        self.publish(&snapshot);
        Some(snapshot)
    }

    /// Number of jobs that have not reached a terminal state.
    pub fn running_count(&self) -> usize {
        self.lock_running().len()
    }

    /// Receives a snapshot after every insert and update.
    pub fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.updates.subscribe()
    }

    fn entry(&self, job_id: &str) -> Option<SharedJob> {
        if let Some(entry) = self.lock_running().get(job_id).cloned() {
            return Some(entry);
        }
        self.finished.get(job_id)
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<String, SharedJob>> {
        match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Running job map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, job: &Job) {
        // No subscribers is not an error.
        let _ = self.updates.send(job.clone());
    }
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("running", &self.running_count())
            .field("finished", &self.finished.entry_count())
            .finish_non_exhaustive()
    }
}
