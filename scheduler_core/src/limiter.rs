use std::{
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures_lite::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::{
    error::LimiterError,
    queue::{BoxedJob, Deliver, QueueEntry},
    retry::{run_with_retry, RetryConfig},
    state::LimiterState,
    task::{JobHandle, JobId, JobStatus, StatusCell},
};

struct Shared {
    concurrency: usize,
    default_retry: Option<RetryConfig>,
    state: Mutex<LimiterState>,
}

/// Runs submitted jobs with at most `concurrency` of them in flight.
///
/// Jobs are admitted strictly in submission order as slots free up, each one
/// optionally retried with backoff. Clones share the same slots and queue.
#[derive(Clone)]
pub struct Limiter {
    shared: Arc<Shared>,
}

#[derive(Debug, Clone)]
pub struct LimiterBuilder {
    concurrency: usize,
    default_retry: Option<RetryConfig>,
}

impl LimiterBuilder {
    /// Retry config used by every submission that doesn't bring its own.
    pub fn default_retry(mut self, retry: RetryConfig) -> Self {
        self.default_retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<Limiter, LimiterError> {
        if self.concurrency < 1 {
            return Err(LimiterError::InvalidArgument(format!(
                "concurrency must be >= 1, got {}",
                self.concurrency
            )));
        }
        if let Some(retry) = &self.default_retry {
            retry.validate()?;
        }

        Ok(Limiter {
            shared: Arc::new(Shared {
                concurrency: self.concurrency,
                default_retry: self.default_retry,
                state: Mutex::new(LimiterState::new(self.concurrency)),
            }),
        })
    }
}

impl Limiter {
    pub fn new(concurrency: usize) -> Result<Self, LimiterError> {
        Self::builder(concurrency).build()
    }

    pub fn with_default_retry(concurrency: usize, retry: RetryConfig) -> Result<Self, LimiterError> {
        Self::builder(concurrency).default_retry(retry).build()
    }

    pub fn builder(concurrency: usize) -> LimiterBuilder {
        LimiterBuilder {
            concurrency,
            default_retry: None,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    pub fn default_retry(&self) -> Option<&RetryConfig> {
        self.shared.default_retry.as_ref()
    }

    pub fn active_count(&self) -> usize {
        self.lock_state().active()
    }

    pub fn pending_count(&self) -> usize {
        self.lock_state().pending()
    }

    /// Queues `op` and returns a handle resolving to its result.
    ///
    /// `retry` replaces the limiter's default retry config for this job only.
    /// With neither, the job gets a single attempt. The job is admitted as soon
    /// as a slot is free, possibly before this returns.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime. Awaiting the returned
    /// handle panics if the runtime shuts down before the job finishes, since
    /// the job is dropped with it and there is no result of type `E` to hand
    /// back.
    pub fn submit<F, Fut, T, E>(&self, op: F, retry: Option<RetryConfig>) -> JobHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let id = JobId::new();
        let status = StatusCell::new();
        let effective = retry.or(self.shared.default_retry);
        let (sink, receiver) = oneshot::channel();

        let job_status = status.clone();
        let job: BoxedJob = Box::pin(async move {
            // a panicking job still has to give its slot back
            let outcome = AssertUnwindSafe(run_with_retry(op, effective.as_ref()))
                .catch_unwind()
                .await;
            job_status.set(match &outcome {
                Ok(Ok(_)) => JobStatus::Succeeded,
                _ => JobStatus::Failed,
            });

            Box::new(move || {
                // the caller may have dropped the handle, nobody to tell then
                let _ = sink.send(outcome);
            }) as Deliver
        });

        let mut state = self.lock_state();
        state.enqueue(QueueEntry::new(id, status.clone(), job));
        trace!(job_id = %id, retry = effective.is_some(), pending = state.pending(), "job queued");
        self.schedule(state);

        JobHandle::new(id, status, receiver)
    }

    /// Same as [`Limiter::submit`] with no per-call retry config.
    pub fn submit_with_default<F, Fut, T, E>(&self, op: F) -> JobHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit(op, None)
    }

    fn lock_state(&self) -> MutexGuard<'_, LimiterState> {
        // the critical sections never panic, a poisoned lock still holds valid state
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits whatever fits into the free slots, still under the caller's
    /// lock, then spawns the admitted jobs once the lock is released.
    fn schedule(&self, mut state: MutexGuard<'_, LimiterState>) {
        let admitted = state.admit_ready();
        for entry in &admitted {
            debug!(job_id = %entry.id, active = state.active(), pending = state.pending(), "job admitted");
        }
        drop(state);

        for entry in admitted {
            let limiter = self.clone();
            tokio::spawn(async move {
                let QueueEntry { id, status, job } = entry;
                let deliver = job.await;
                limiter.release(id, status.get());
                deliver();
            });
        }
    }

    /// Gives a finished job's slot back and admits the next queued ones.
    fn release(&self, id: JobId, status: JobStatus) {
        let mut state = self.lock_state();
        state.release();
        debug!(job_id = %id, ?status, active = state.active(), "job finished");
        self.schedule(state);
    }
}

impl fmt::Debug for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Limiter")
            .field("concurrency", &self.shared.concurrency)
            .field("active", &state.active())
            .field("pending", &state.pending())
            .field("default_retry", &self.shared.default_retry)
            .finish()
    }
}
