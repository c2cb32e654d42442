//! Priority job queue for text-to-speech synthesis.
//!
//! Jobs are ordered by ascending priority, run with bounded concurrency,
//! raced against a timeout and retried from the front of the queue. Results
//! are delivered as [`JobEvent`]s rather than return values, and successful
//! results populate a content-addressed cache so repeated text never hits
//! the backend twice.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{
    MediaProbe, SynthesisBackend, SynthesisError, SynthesisOptions, SynthesisOutput,
    SynthesisResult,
};
use crate::core::cache::{CacheConfig, CacheStore, XxHasher};
use crate::core::events::EventBus;

/// Queue tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on jobs in the processing map.
    pub max_concurrent_jobs: usize,
    /// Per-attempt timeout for the backend call and the metadata load.
    pub timeout_ms: u64,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            timeout_ms: 15_000,
            retry_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// A queued synthesis request.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub id: String,
    pub text: String,
    pub options: SynthesisOptions,
    /// Lower runs sooner.
    pub priority: i64,
    pub status: JobStatus,
    /// Retries consumed so far.
    pub attempts: u32,
    pub cache_key: String,
}

/// One entry of [`SynthesisJobQueue::enqueue_batch`].
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: String,
    pub text: String,
    pub options: SynthesisOptions,
    pub priority: i64,
}

/// Lifecycle notifications from the queue.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Completed {
        job_id: String,
        output: Arc<SynthesisOutput>,
        from_cache: bool,
    },
    /// A failed attempt was put back at the front of the queue.
    Retrying {
        job_id: String,
        attempt: u32,
        error: String,
    },
    /// Retries are exhausted. `attempts` counts every backend attempt.
    Failed {
        job_id: String,
        error: String,
        attempts: u32,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Completed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub processing: usize,
    pub cache_size: u64,
    pub backend_calls: u64,
    pub completed: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_inserts: u64,
    pub retries: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<SynthesisJob>,
    processing: HashMap<String, SynthesisJob>,
    /// Bumped by `clear`; results from an older epoch are discarded.
    epoch: u64,
    drain_scheduled: bool,
    completed: u64,
    failed: u64,
    retries: u64,
}

struct QueueInner {
    config: QueueConfig,
    backend: Arc<dyn SynthesisBackend>,
    probe: Arc<dyn MediaProbe>,
    cache: CacheStore<Arc<SynthesisOutput>>,
    hasher: XxHasher,
    state: Mutex<QueueState>,
    events: EventBus<JobEvent>,
    backend_calls: AtomicU64,
    cancel_token: Mutex<CancellationToken>,
}

/// Cheaply cloneable handle to a synthesis queue.
#[derive(Clone)]
pub struct SynthesisJobQueue {
    inner: Arc<QueueInner>,
}

impl SynthesisJobQueue {
    pub fn new(
        config: QueueConfig,
        backend: Arc<dyn SynthesisBackend>,
        probe: Arc<dyn MediaProbe>,
        cache_config: &CacheConfig,
    ) -> Self {
        info!(
            "Creating synthesis queue for backend '{}' (concurrency={}, timeout={}ms, retries={})",
            backend.name(),
            config.max_concurrent_jobs,
            config.timeout_ms,
            config.retry_attempts
        );
        Self {
            inner: Arc::new(QueueInner {
                config,
                backend,
                probe,
                cache: CacheStore::new(cache_config),
                hasher: XxHasher::new("synthesis"),
                state: Mutex::new(QueueState::default()),
                events: EventBus::new(),
                backend_calls: AtomicU64::new(0),
                cancel_token: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Deterministic cache key for `(text, options)`.
    pub fn cache_key(&self, text: &str, options: &SynthesisOptions) -> String {
        self.inner.hasher.hash_pair(text, &options.fingerprint())
    }

    /// Queue `text` for synthesis under job `id`.
    ///
    /// A cache hit publishes `Completed { from_cache: true }` without
    /// queueing anything. Otherwise the job is inserted after every job of
    /// equal or lower priority. Draining happens on the next scheduler turn,
    /// so a burst of enqueues is processed in priority order. Must be called
    /// from within a tokio runtime.
    pub fn enqueue(
        &self,
        text: impl Into<String>,
        id: impl Into<String>,
        options: SynthesisOptions,
        priority: i64,
    ) {
        self.enqueue_batch(vec![JobRequest {
            id: id.into(),
            text: text.into(),
            options,
            priority,
        }]);
    }

    /// Queue several jobs under one lock.
    pub fn enqueue_batch(&self, requests: Vec<JobRequest>) {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        for request in requests {
            let cache_key = self.cache_key(&request.text, &request.options);

            if let Some(output) = inner.cache.get(&cache_key) {
                debug!("Cache HIT for job '{}': '{}'", request.id, request.text);
                inner.events.publish(JobEvent::Completed {
                    job_id: request.id,
                    output,
                    from_cache: true,
                });
                continue;
            }

            if state.processing.contains_key(&request.id)
                || state.pending.iter().any(|job| job.id == request.id)
            {
                warn!("Ignoring duplicate synthesis job '{}'", request.id);
                continue;
            }

            let position = state
                .pending
                .iter()
                .position(|job| job.priority > request.priority)
                .unwrap_or(state.pending.len());

            debug!(
                "Queued synthesis job '{}' (priority {}) at position {}",
                request.id, request.priority, position
            );
            state.pending.insert(
                position,
                SynthesisJob {
                    id: request.id,
                    text: request.text,
                    options: request.options,
                    priority: request.priority,
                    status: JobStatus::Queued,
                    attempts: 0,
                    cache_key,
                },
            );
        }

        inner.schedule_drain(&mut state);
    }

    /// Drop every queued job and discard results still in flight.
    ///
    /// Returns the number of jobs that were queued or processing.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.epoch += 1;
        let dropped = state.pending.len() + state.processing.len();
        state.pending.clear();
        state.processing.clear();
        state.drain_scheduled = false;

        let mut token = self.inner.cancel_token.lock();
        token.cancel();
        *token = CancellationToken::new();

        if dropped > 0 {
            debug!("Cleared {} synthesis job(s)", dropped);
        }
        dropped
    }

    /// Drop all cached results.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        let cache = self.inner.cache.metrics();
        QueueStatus {
            queued: state.pending.len(),
            processing: state.processing.len(),
            cache_size: self.inner.cache.len(),
            backend_calls: self.inner.backend_calls.load(Ordering::Relaxed),
            completed: state.completed,
            failed: state.failed,
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            cache_inserts: cache.inserts(),
            retries: state.retries,
        }
    }

    /// Ids of queued jobs in dequeue order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .pending
            .iter()
            .map(|job| job.id.clone())
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.pending.is_empty() && state.processing.is_empty()
    }
}

impl QueueInner {
    fn schedule_drain(self: &Arc<Self>, state: &mut QueueState) {
        if state.drain_scheduled || state.pending.is_empty() {
            return;
        }
        state.drain_scheduled = true;
        let inner = self.clone();
        tokio::spawn(async move {
            inner.drain();
        });
    }

    /// Move jobs into the processing map up to the concurrency limit.
    fn drain(self: &Arc<Self>) {
        let limit = self.config.max_concurrent_jobs.max(1);
        let (started, epoch, token) = {
            let mut state = self.state.lock();
            state.drain_scheduled = false;

            let mut started = Vec::new();
            while state.processing.len() < limit {
                let Some(mut job) = state.pending.pop_front() else {
                    break;
                };
                job.status = JobStatus::Processing;
                state.processing.insert(job.id.clone(), job.clone());
                started.push(job);
            }
            (started, state.epoch, self.cancel_token.lock().clone())
        };

        for job in started {
            let inner = self.clone();
            let token = token.clone();
            tokio::spawn(async move {
                inner.run_job(job, epoch, token).await;
            });
        }
    }

    async fn run_job(self: Arc<Self>, job: SynthesisJob, epoch: u64, token: CancellationToken) {
        debug!("Processing synthesis job '{}' (attempt {})", job.id, job.attempts + 1);

        let outcome = tokio::select! {
            _ = token.cancelled() => {
                debug!("Synthesis job '{}' cancelled", job.id);
                return;
            }
            outcome = self.attempt(&job) => outcome,
        };

        self.settle(job, epoch, outcome);
        self.drain();
    }

    async fn attempt(&self, job: &SynthesisJob) -> SynthesisResult<SynthesisOutput> {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
        let limit = Duration::from_millis(self.config.timeout_ms);

        let audio =
            match tokio::time::timeout(limit, self.backend.synthesize(&job.text, &job.options))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(SynthesisError::Timeout(self.config.timeout_ms)),
            };

        let duration_secs = match tokio::time::timeout(limit, self.probe.load_duration(&audio)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(SynthesisError::MediaLoadFailed(
                    "timed out loading metadata".to_string(),
                ));
            }
        };

        Ok(SynthesisOutput {
            audio,
            duration_secs,
        })
    }

    fn settle(
        &self,
        mut job: SynthesisJob,
        epoch: u64,
        outcome: SynthesisResult<SynthesisOutput>,
    ) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            debug!("Discarding result for superseded job '{}'", job.id);
            return;
        }
        if state.processing.remove(&job.id).is_none() {
            return;
        }

        match outcome {
            Ok(output) => {
                let output = Arc::new(output);
                self.cache.put(job.cache_key.clone(), output.clone());
                state.completed += 1;
                info!(
                    "Synthesis job '{}' completed ({:.2}s of audio)",
                    job.id, output.duration_secs
                );
                self.events.publish(JobEvent::Completed {
                    job_id: job.id,
                    output,
                    from_cache: false,
                });
            }
            Err(e) if job.attempts < self.config.retry_attempts => {
                job.attempts += 1;
                job.status = JobStatus::Queued;
                state.retries += 1;
                warn!(
                    "Synthesis job '{}' failed ({}), retry {}/{}",
                    job.id, e, job.attempts, self.config.retry_attempts
                );
                self.events.publish(JobEvent::Retrying {
                    job_id: job.id.clone(),
                    attempt: job.attempts,
                    error: e.to_string(),
                });
                state.pending.push_front(job);
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                state.failed += 1;
                error!(
                    "Synthesis job '{}' failed after {} attempt(s): {}",
                    job.id,
                    job.attempts + 1,
                    e
                );
                self.events.publish(JobEvent::Failed {
                    job_id: job.id,
                    error: e.to_string(),
                    attempts: job.attempts + 1,
                });
            }
        }
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        self.cancel_token.lock().cancel();
    }
}


#[cfg(test)]
mod tests {
    use super::super::base::{MetadataProbe, SynthesizedAudio};
    use super::testing::MockBackend;
    use super::*;
    use async_trait::async_trait;

    fn queue_with(backend: Arc<MockBackend>, config: QueueConfig) -> SynthesisJobQueue {
        SynthesisJobQueue::new(
            config,
            backend,
            Arc::new(MetadataProbe),
            &CacheConfig::default(),
        )
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> JobEvent {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if !matches!(event, JobEvent::Retrying { .. }) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend.clone(), QueueConfig::default());
        let mut rx = queue.subscribe();

        queue.enqueue("Hello there.", "a", SynthesisOptions::default(), 0);
        match next_terminal(&mut rx).await {
            JobEvent::Completed {
                job_id, from_cache, ..
            } => {
                assert_eq!(job_id, "a");
                assert!(!from_cache);
            }
            other => panic!("unexpected event {other:?}"),
        }

        queue.enqueue("Hello there.", "b", SynthesisOptions::default(), 0);
        match next_terminal(&mut rx).await {
            JobEvent::Completed {
                job_id,
                from_cache,
                output,
            } => {
                assert_eq!(job_id, "b");
                assert!(from_cache);
                assert_eq!(output.duration_secs, 1.0);
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(backend.call_count(), 1);
        let status = queue.status();
        assert_eq!(status.cache_hits, 1);
        assert_eq!(status.cache_misses, 1);
        assert_eq!(status.cache_inserts, 1);
        assert_eq!(status.cache_size, 1);
    }

    #[tokio::test]
    async fn test_different_options_miss_the_cache() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend.clone(), QueueConfig::default());
        let mut rx = queue.subscribe();

        queue.enqueue("Same text", "a", SynthesisOptions::default(), 0);
        next_terminal(&mut rx).await;

        let options = SynthesisOptions {
            voice: Some("other".to_string()),
            ..Default::default()
        };
        queue.enqueue("Same text", "b", options, 0);
        match next_terminal(&mut rx).await {
            JobEvent::Completed { from_cache, .. } => assert!(!from_cache),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_bound_is_attempts_plus_one() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_text("doomed");
        let queue = queue_with(
            backend.clone(),
            QueueConfig {
                retry_attempts: 2,
                ..Default::default()
            },
        );
        let mut rx = queue.subscribe();

        queue.enqueue("doomed", "job", SynthesisOptions::default(), 0);

        let mut retries = 0;
        loop {
            match rx.recv().await.expect("channel closed") {
                JobEvent::Retrying { attempt, .. } => {
                    retries += 1;
                    assert_eq!(attempt, retries);
                }
                JobEvent::Failed {
                    job_id,
                    attempts,
                    error,
                } => {
                    assert_eq!(job_id, "job");
                    assert_eq!(attempts, 3);
                    assert!(error.contains("mock failure"));
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        assert_eq!(retries, 2);
        assert_eq!(backend.call_count(), 3);
        assert_eq!(queue.status().failed, 1);
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let backend = Arc::new(MockBackend::new().failing_first(1));
        let queue = queue_with(backend.clone(), QueueConfig::default());
        let mut rx = queue.subscribe();

        queue.enqueue("flaky", "job", SynthesisOptions::default(), 0);
        assert!(matches!(rx.recv().await, Some(JobEvent::Retrying { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(JobEvent::Completed { from_cache: false, .. })
        ));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_priority_order_with_single_worker() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(
            backend.clone(),
            QueueConfig {
                max_concurrent_jobs: 1,
                ..Default::default()
            },
        );
        let mut rx = queue.subscribe();

        queue.enqueue("p3", "c", SynthesisOptions::default(), 3);
        queue.enqueue("p1", "a", SynthesisOptions::default(), 1);
        queue.enqueue("p2", "b", SynthesisOptions::default(), 2);
        assert_eq!(queue.pending_ids(), vec!["a", "b", "c"]);

        for _ in 0..3 {
            next_terminal(&mut rx).await;
        }
        assert_eq!(backend.calls(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_equal_priorities_keep_arrival_order() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend, QueueConfig::default());

        queue.enqueue("x", "first", SynthesisOptions::default(), 5);
        queue.enqueue("y", "second", SynthesisOptions::default(), 5);
        queue.enqueue("z", "urgent", SynthesisOptions::default(), 0);
        assert_eq!(queue.pending_ids(), vec!["urgent", "first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let backend = Arc::new(MockBackend::new().with_delay(Duration::from_millis(100)));
        let queue = queue_with(
            backend.clone(),
            QueueConfig {
                max_concurrent_jobs: 2,
                ..Default::default()
            },
        );
        let mut rx = queue.subscribe();

        for i in 0..6 {
            queue.enqueue(format!("text {i}"), format!("job-{i}"), SynthesisOptions::default(), i);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = queue.status();
        assert_eq!(status.processing, 2);
        assert_eq!(status.queued, 4);

        for _ in 0..6 {
            next_terminal(&mut rx).await;
        }
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(queue.status().completed, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let backend = Arc::new(MockBackend::new().with_delay(Duration::from_secs(60)));
        let queue = queue_with(
            backend.clone(),
            QueueConfig {
                timeout_ms: 1_000,
                retry_attempts: 1,
                ..Default::default()
            },
        );
        let mut rx = queue.subscribe();

        queue.enqueue("slow", "job", SynthesisOptions::default(), 0);
        match next_terminal(&mut rx).await {
            JobEvent::Failed { error, attempts, .. } => {
                assert_eq!(attempts, 2);
                assert!(error.contains("timed out"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(backend.call_count(), 2);
    }

    struct FailingProbe;

    #[async_trait]
    impl MediaProbe for FailingProbe {
        async fn load_duration(&self, _audio: &SynthesizedAudio) -> SynthesisResult<f64> {
            Err(SynthesisError::MediaLoadFailed("corrupt header".to_string()))
        }
    }

    #[tokio::test]
    async fn test_metadata_failure_is_retried_like_synthesis_failure() {
        let backend = Arc::new(MockBackend::new());
        let queue = SynthesisJobQueue::new(
            QueueConfig {
                retry_attempts: 1,
                ..Default::default()
            },
            backend.clone(),
            Arc::new(FailingProbe),
            &CacheConfig::default(),
        );
        let mut rx = queue.subscribe();

        queue.enqueue("fine text", "job", SynthesisOptions::default(), 0);
        match next_terminal(&mut rx).await {
            JobEvent::Failed { error, .. } => assert!(error.contains("corrupt header")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(backend.call_count(), 2);
        assert_eq!(queue.status().cache_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_in_flight_results() {
        let backend = Arc::new(MockBackend::new().with_delay(Duration::from_millis(500)));
        let queue = queue_with(
            backend.clone(),
            QueueConfig {
                max_concurrent_jobs: 1,
                ..Default::default()
            },
        );
        let mut rx = queue.subscribe();

        queue.enqueue("one", "a", SynthesisOptions::default(), 0);
        queue.enqueue("two", "b", SynthesisOptions::default(), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.status().processing, 1);

        assert_eq!(queue.clear(), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(rx.try_recv().is_err());
        assert!(queue.is_idle());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_ignored() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend, QueueConfig::default());

        queue.enqueue("x", "same", SynthesisOptions::default(), 0);
        queue.enqueue("y", "same", SynthesisOptions::default(), 0);
        assert_eq!(queue.pending_ids(), vec!["same"]);
    }
}
