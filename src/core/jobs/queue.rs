//! Durable Job Queue
//!
//! One JSON file under the library state directory holds every job, bucketed
//! by state. All mutations run under the queue path lock and write back
//! atomically, so a crash mid-mutation leaves the previous consistent file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::fs::atomic_write_json_pretty;
use crate::core::fs::lock::{with_path_lock, LockConfig};
use crate::core::library::STATE_DIR_NAME;
use crate::core::{CoreError, CoreResult};

use super::{Job, JobOptions, JobState};

/// Queue file name under the state directory
pub const QUEUE_FILE: &str = "jobs.json";

// =============================================================================
// Queue State
// =============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueState {
    waiting: Vec<Job>,
    active: Vec<Job>,
    delayed: Vec<Job>,
    failed: Vec<Job>,
    completed: Vec<Job>,
}

impl QueueState {
    fn bucket_mut(&mut self, state: JobState) -> &mut Vec<Job> {
        match state {
            JobState::Waiting => &mut self.waiting,
            JobState::Active => &mut self.active,
            JobState::Delayed => &mut self.delayed,
            JobState::Failed => &mut self.failed,
            JobState::Completed => &mut self.completed,
        }
    }

    fn bucket(&self, state: JobState) -> &Vec<Job> {
        match state {
            JobState::Waiting => &self.waiting,
            JobState::Active => &self.active,
            JobState::Delayed => &self.delayed,
            JobState::Failed => &self.failed,
            JobState::Completed => &self.completed,
        }
    }

    fn all_jobs(&self) -> impl Iterator<Item = &Job> {
        JobState::ALL.iter().flat_map(|s| self.bucket(*s).iter())
    }

    /// Removes a job from whichever bucket holds it
    fn take(&mut self, job_id: &str) -> Option<Job> {
        for state in JobState::ALL {
            let bucket = self.bucket_mut(state);
            if let Some(pos) = bucket.iter().position(|j| j.id == job_id) {
                return Some(bucket.remove(pos));
            }
        }
        None
    }
}

// =============================================================================
// Job Queue
// =============================================================================

/// Durable, lock-guarded job queue
#[derive(Clone, Debug)]
pub struct JobQueue {
    queue_path: PathBuf,
    lock_config: LockConfig,
}

impl JobQueue {
    /// Creates a queue stored at `{library_root}/.scenedex/jobs.json`
    pub fn new(library_root: impl Into<PathBuf>) -> Self {
        Self {
            queue_path: library_root.into().join(STATE_DIR_NAME).join(QUEUE_FILE),
            lock_config: LockConfig::default(),
        }
    }

    pub fn with_lock_config(mut self, lock_config: LockConfig) -> Self {
        self.lock_config = lock_config;
        self
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    fn read_state(&self) -> CoreResult<QueueState> {
        if !self.queue_path.is_file() {
            return Ok(QueueState::default());
        }
        let bytes = std::fs::read(&self.queue_path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::QueueCorrupted(e.to_string()))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut QueueState) -> CoreResult<T>) -> CoreResult<T> {
        with_path_lock(&self.queue_path, self.lock_config, || {
            let mut state = self.read_state()?;
            let result = f(&mut state)?;
            atomic_write_json_pretty(&self.queue_path, &state)?;
            Ok(result)
        })
    }

    // =========================================================================
    // Producer Side
    // =========================================================================

    /// Enqueues a new waiting job and returns it
    pub fn enqueue(
        &self,
        family: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> CoreResult<Job> {
        let job = Job::new(family, payload, options);
        let enqueued = job.clone();
        self.mutate(|state| {
            state.waiting.push(job);
            Ok(())
        })?;
        debug!(job_id = %enqueued.id, family = %enqueued.family, "enqueued job");
        Ok(enqueued)
    }

    /// Finds jobs whose payload has `field` equal to `value`, in any state
    pub fn find_by_payload_field(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> CoreResult<Vec<Job>> {
        let state = self.read_state()?;
        Ok(state
            .all_jobs()
            .filter(|j| j.payload_field(field) == Some(value))
            .cloned()
            .collect())
    }

    /// Removes a job in any state. Returns false when no such job exists.
    pub fn remove(&self, job_id: &str) -> CoreResult<bool> {
        self.mutate(|state| Ok(state.take(job_id).is_some()))
    }

    /// Removes every non-terminal job matching a payload field. Returns the
    /// number removed.
    pub fn cancel_by_payload_field(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> CoreResult<usize> {
        self.mutate(|state| {
            let mut removed = 0;
            for bucket_state in [JobState::Waiting, JobState::Active, JobState::Delayed] {
                let bucket = state.bucket_mut(bucket_state);
                let before = bucket.len();
                bucket.retain(|j| j.payload_field(field) != Some(value));
                removed += before - bucket.len();
            }
            Ok(removed)
        })
    }

    /// Returns all jobs in one state
    pub fn jobs_in(&self, state: JobState) -> CoreResult<Vec<Job>> {
        Ok(self.read_state()?.bucket(state).clone())
    }

    // =========================================================================
    // Worker Side
    // =========================================================================

    /// Claims the next runnable job, if any.
    ///
    /// Delayed jobs whose `run_at` has passed are promoted to waiting first,
    /// then the oldest waiting job moves to active with its attempt counter
    /// incremented.
    pub fn claim_next(&self) -> CoreResult<Option<Job>> {
        self.mutate(|state| {
            let now = Utc::now();
            let due: Vec<usize> = state
                .delayed
                .iter()
                .enumerate()
                .filter(|(_, j)| is_due(j, now))
                .map(|(i, _)| i)
                .collect();
            for i in due.into_iter().rev() {
                let mut job = state.delayed.remove(i);
                job.state = JobState::Waiting;
                job.run_at = None;
                state.waiting.push(job);
            }

            if state.waiting.is_empty() {
                return Ok(None);
            }
            let mut job = state.waiting.remove(0);
            job.state = JobState::Active;
            job.attempts += 1;
            state.active.push(job.clone());
            Ok(Some(job))
        })
    }

    /// Marks an active job completed
    pub fn complete(&self, job_id: &str) -> CoreResult<()> {
        self.mutate(|state| {
            let mut job = state
                .take(job_id)
                .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;
            job.state = JobState::Completed;
            job.completed_at = Some(Utc::now().to_rfc3339());
            state.completed.push(job);
            Ok(())
        })
    }

    /// Records a failed attempt.
    ///
    /// The job is delayed for its backoff interval until attempts are
    /// exhausted, then parked in the failed bucket.
    pub fn fail(&self, job_id: &str, error: &str) -> CoreResult<()> {
        self.mutate(|state| {
            let mut job = state
                .take(job_id)
                .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;
            job.last_error = Some(error.to_string());
            if job.attempts >= job.max_attempts {
                job.state = JobState::Failed;
                job.run_at = None;
                state.failed.push(job);
            } else {
                let delay = job.backoff.delay_for_attempt(job.attempts);
                let run_at = Utc::now()
                    + chrono::Duration::milliseconds(delay.as_millis() as i64);
                job.state = JobState::Delayed;
                job.run_at = Some(run_at.to_rfc3339());
                state.delayed.push(job);
            }
            Ok(())
        })
    }
}

fn is_due(job: &Job, now: DateTime<Utc>) -> bool {
    match &job.run_at {
        Some(run_at) => DateTime::parse_from_rfc3339(run_at)
            .map(|t| t.with_timezone(&Utc) <= now)
            .unwrap_or(true),
        None => true,
    }
}
