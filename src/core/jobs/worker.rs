//! Job Workers
//!
//! A small pool of tokio tasks polls the queue, runs handlers, and records
//! outcomes. Workers drain on shutdown: a job already claimed finishes before
//! the worker exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::pipeline::IndexingOrchestrator;
use crate::core::{CoreError, CoreResult};

use super::{Job, JobQueue};

// =============================================================================
// Handler
// =============================================================================

/// Executes jobs routed to it by family
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> CoreResult<()>;
}

// =============================================================================
// Worker Pool
// =============================================================================

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    pub num_workers: usize,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: (num_cpus::get() / 2).clamp(1, 4),
            poll_interval_ms: 250,
        }
    }
}

/// Spawns the worker pool. Workers run until `shutdown` is notified.
pub fn start_workers(
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
) -> Vec<JoinHandle<()>> {
    info!(num_workers = config.num_workers, "starting job workers");
    (0..config.num_workers)
        .map(|worker_id| {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                worker_loop(worker_id, queue, handler, config, shutdown).await;
            })
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
) {
    debug!(worker_id, "worker started");
    // One pinned signal for the whole loop: a shutdown fired while a job is
    // executing stays pending and is observed on the next iteration.
    let shutdown_signal = shutdown.notified();
    tokio::pin!(shutdown_signal);
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                debug!(worker_id, "worker shutting down");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {
                match queue_call(&queue, |q| q.claim_next()).await {
                    Ok(Some(job)) => run_job(worker_id, &queue, handler.as_ref(), &job).await,
                    Ok(None) => {}
                    Err(e) => warn!(worker_id, error = %e, "failed to poll job queue"),
                }
            }
        }
    }
}

/// Queue mutations spin on a blocking file lock; run them off the runtime
/// threads.
async fn queue_call<T: Send + 'static>(
    queue: &JobQueue,
    f: impl FnOnce(JobQueue) -> CoreResult<T> + Send + 'static,
) -> CoreResult<T> {
    let queue = queue.clone();
    match tokio::task::spawn_blocking(move || f(queue)).await {
        Ok(result) => result,
        Err(e) => Err(CoreError::Internal(format!("queue task failed: {e}"))),
    }
}

async fn run_job(worker_id: usize, queue: &JobQueue, handler: &dyn JobHandler, job: &Job) {
    debug!(worker_id, job_id = %job.id, family = %job.family, attempt = job.attempts, "running job");
    match handler.handle(job).await {
        Ok(()) => {
            let job_id = job.id.clone();
            if let Err(e) = queue_call(queue, move |q| q.complete(&job_id)).await {
                error!(job_id = %job.id, error = %e, "failed to mark job completed");
            }
        }
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "job attempt failed");
            let job_id = job.id.clone();
            let message = e.to_string();
            if let Err(e) = queue_call(queue, move |q| q.fail(&job_id, &message)).await {
                error!(job_id = %job.id, error = %e, "failed to record job failure");
            }
        }
    }
}

// =============================================================================
// Library Handler
// =============================================================================

/// Job families understood by [`LibraryJobHandler`]
pub mod families {
    /// Scan a folder and index newly found videos
    pub const FOLDER_SCAN: &str = "folderScan";
    /// Index an explicit list already scanned elsewhere
    pub const BULK_IMPORT: &str = "bulkImport";
}

/// Routes indexing job families to the orchestrator
pub struct LibraryJobHandler {
    orchestrator: Arc<IndexingOrchestrator>,
}

impl LibraryJobHandler {
    pub fn new(orchestrator: Arc<IndexingOrchestrator>) -> Self {
        Self { orchestrator }
    }

    fn payload_path(job: &Job) -> CoreResult<std::path::PathBuf> {
        job.payload_field("path")
            .and_then(|v| v.as_str())
            .map(std::path::PathBuf::from)
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "Job {} has no string 'path' in its payload",
                    job.id
                ))
            })
    }
}

#[async_trait]
impl JobHandler for LibraryJobHandler {
    async fn handle(&self, job: &Job) -> CoreResult<()> {
        match job.family.as_str() {
            families::FOLDER_SCAN | families::BULK_IMPORT => {
                let path = Self::payload_path(job)?;
                let outcomes = self.orchestrator.index_folder(&path).await?;
                let failed = outcomes
                    .iter()
                    .filter(|(_, o)| matches!(o, crate::core::pipeline::VideoOutcome::Failed { .. }))
                    .count();
                info!(
                    job_id = %job.id,
                    videos = outcomes.len(),
                    failed,
                    "indexing job finished"
                );
                Ok(())
            }
            other => Err(CoreError::UnknownJobFamily(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::{JobOptions, JobState};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingHandler {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> CoreResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(CoreError::Internal("first attempt fails".to_string()));
            }
            Ok(())
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            num_workers: 2,
            poll_interval_ms: 10,
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test]
    async fn test_workers_drain_queue_and_stop_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let queue = JobQueue::new(dir.path());
        for i in 0..3 {
            queue
                .enqueue("noop", json!({"n": i}), JobOptions::default())
                .unwrap();
        }

        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let shutdown = Arc::new(Notify::new());
        let handles = start_workers(
            queue.clone(),
            handler.clone(),
            fast_config(),
            shutdown.clone(),
        );

        let queue_check = queue.clone();
        wait_for(|| {
            queue_check
                .jobs_in(JobState::Completed)
                .map(|j| j.len() == 3)
                .unwrap_or(false)
        })
        .await;

        shutdown.notify_waiters();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_during_running_job_stops_workers() {
        struct SlowHandler {
            started: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl JobHandler for SlowHandler {
            async fn handle(&self, _job: &Job) -> CoreResult<()> {
                self.started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let queue = JobQueue::new(dir.path());
        queue
            .enqueue("slow", json!({}), JobOptions::default())
            .unwrap();

        let started = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(Notify::new());
        let handles = start_workers(
            queue.clone(),
            Arc::new(SlowHandler {
                started: started.clone(),
            }),
            fast_config(),
            shutdown.clone(),
        );

        let started_check = started.clone();
        wait_for(move || started_check.load(Ordering::SeqCst) > 0).await;
        // Fired while the claimed job is still executing; every worker must
        // still observe it and exit.
        shutdown.notify_waiters();

        tokio::time::timeout(Duration::from_secs(5), async {
            for handle in handles {
                handle.await.unwrap();
            }
        })
        .await
        .unwrap();

        // The in-flight job drained before its worker exited.
        assert_eq!(queue.jobs_in(JobState::Completed).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_is_retried() {
        let dir = TempDir::new().unwrap();
        let queue = JobQueue::new(dir.path());
        queue
            .enqueue(
                "flaky",
                json!({}),
                JobOptions {
                    max_attempts: 3,
                    backoff: crate::core::jobs::BackoffPolicy::Exponential { base_delay_ms: 5 },
                },
            )
            .unwrap();

        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first: true,
        });
        let shutdown = Arc::new(Notify::new());
        let handles = start_workers(
            queue.clone(),
            handler.clone(),
            fast_config(),
            shutdown.clone(),
        );

        let queue_check = queue.clone();
        wait_for(|| {
            queue_check
                .jobs_in(JobState::Completed)
                .map(|j| j.len() == 1)
                .unwrap_or(false)
        })
        .await;

        shutdown.notify_waiters();
        for handle in handles {
            handle.await.unwrap();
        }

        let completed = queue.jobs_in(JobState::Completed).unwrap();
        assert_eq!(completed[0].attempts, 2);
        assert!(completed[0].last_error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_family_is_rejected() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Arc::new(IndexingOrchestrator::new(
            dir.path(),
            Arc::new(NoopTranscriber),
            Arc::new(NoopAnalyzer),
            Arc::new(NoopEmbedder),
        ));
        let handler = LibraryJobHandler::new(orchestrator);

        let job = Job::new("mystery", json!({}), JobOptions::default());
        let result = handler.handle(&job).await;
        assert!(matches!(result, Err(CoreError::UnknownJobFamily(_))));
    }

    struct NoopTranscriber;
    struct NoopAnalyzer;
    struct NoopEmbedder;

    #[async_trait]
    impl crate::core::providers::TranscriptionProvider for NoopTranscriber {
        async fn transcribe(
            &self,
            _video_path: &std::path::Path,
            _on_progress: crate::core::providers::ProgressFn,
        ) -> CoreResult<Vec<crate::core::artifacts::TranscriptSegment>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl crate::core::providers::FrameAnalysisProvider for NoopAnalyzer {
        async fn analyze(
            &self,
            _video_path: &std::path::Path,
            _on_progress: crate::core::providers::ProgressFn,
        ) -> CoreResult<crate::core::providers::FrameAnalysis> {
            Ok(crate::core::providers::FrameAnalysis {
                category: "unknown".to_string(),
                segments: vec![],
                faces: vec![],
            })
        }
    }

    #[async_trait]
    impl crate::core::providers::EmbeddingProvider for NoopEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
            Ok(vec![0.0, 0.0])
        }
    }
}
