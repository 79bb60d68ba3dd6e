//! Background Job System
//!
//! Long-running work (folder scans, bulk imports) runs as durable jobs. The
//! queue is a JSON file with one bucket per state, mutated under the queue
//! path lock so enqueuers and workers in different processes cooperate.

pub mod queue;
pub mod worker;

pub use queue::JobQueue;
pub use worker::{start_workers, JobHandler, LibraryJobHandler, WorkerConfig};

use serde::{Deserialize, Serialize};

use crate::core::JobId;

// =============================================================================
// Job States
// =============================================================================

/// Lifecycle state of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    /// Ready to be claimed
    Waiting,
    /// Claimed by a worker
    Active,
    /// Failed, waiting out its backoff delay
    Delayed,
    /// Exhausted its attempts
    Failed,
    /// Finished successfully
    Completed,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Delayed,
        JobState::Failed,
        JobState::Completed,
    ];
}

// =============================================================================
// Backoff
// =============================================================================

const MAX_BACKOFF_MS: u64 = 60 * 60 * 1000;

/// Retry delay policy
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackoffPolicy {
    /// `base_delay_ms * 2^(attempt - 1)`, capped at one hour
    #[serde(rename_all = "camelCase")]
    Exponential { base_delay_ms: u64 },
}

impl BackoffPolicy {
    /// Delay before the next run after `attempt` failures (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        match self {
            BackoffPolicy::Exponential { base_delay_ms } => {
                let shift = attempt.saturating_sub(1).min(20);
                let ms = base_delay_ms.saturating_mul(1 << shift).min(MAX_BACKOFF_MS);
                std::time::Duration::from_millis(ms)
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base_delay_ms: 1000,
        }
    }
}

/// Retry configuration for a job
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

// =============================================================================
// Job
// =============================================================================

/// A durable unit of background work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    /// Job family routed to a handler (e.g. "folderScan")
    pub family: String,
    /// Arbitrary JSON payload
    pub payload: serde_json::Value,
    pub state: JobState,
    /// Attempts made so far
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// RFC 3339 enqueue timestamp
    pub created_at: String,
    /// Earliest RFC 3339 time a delayed job may run
    pub run_at: Option<String>,
    pub last_error: Option<String>,
    pub completed_at: Option<String>,
}

impl Job {
    pub fn new(family: impl Into<String>, payload: serde_json::Value, options: JobOptions) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            family: family.into(),
            payload,
            state: JobState::Waiting,
            attempts: 0,
            max_attempts: options.max_attempts,
            backoff: options.backoff,
            created_at: chrono::Utc::now().to_rfc3339(),
            run_at: None,
            last_error: None,
            completed_at: None,
        }
    }

    /// Whether the job has reached a terminal state
    pub fn is_done(&self) -> bool {
        matches!(self.state, JobState::Failed | JobState::Completed)
    }

    /// Returns a top-level payload field, if present
    pub fn payload_field(&self, field: &str) -> Option<&serde_json::Value> {
        self.payload.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = BackoffPolicy::Exponential {
            base_delay_ms: 1000,
        };
        assert_eq!(backoff.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(backoff.delay_for_attempt(2).as_millis(), 2000);
        assert_eq!(backoff.delay_for_attempt(3).as_millis(), 4000);
        assert_eq!(
            backoff.delay_for_attempt(30).as_millis() as u64,
            MAX_BACKOFF_MS
        );
    }

    #[test]
    fn test_new_job_starts_waiting() {
        let job = Job::new("folderScan", json!({"path": "/videos"}), JobOptions::default());
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts, 0);
        assert!(!job.is_done());
        assert_eq!(
            job.payload_field("path"),
            Some(&json!("/videos"))
        );
    }

    #[test]
    fn test_job_state_serialization() {
        assert_eq!(
            serde_json::to_string(&JobState::Waiting).unwrap(),
            "\"waiting\""
        );
        let parsed: JobState = serde_json::from_str("\"delayed\"").unwrap();
        assert_eq!(parsed, JobState::Delayed);
    }
}
