use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{ready, Context, Poll},
};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a submitted job: `Queued -> Running -> Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Status shared between the queue entry and the caller's handle.
#[derive(Debug, Clone)]
pub(crate) struct StatusCell(Arc<Mutex<JobStatus>>);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(JobStatus::Queued)))
    }

    pub(crate) fn get(&self) -> JobStatus {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, status: JobStatus) {
        let mut current = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        // terminal states are final
        if !current.is_terminal() {
            *current = status;
        }
    }
}

/// What the runner hands back: the job's own result, or the payload of a panic
/// raised while running it.
pub(crate) type JobOutcome<T, E> = std::thread::Result<Result<T, E>>;

/// Pending result of a submitted job.
///
/// Resolves to exactly what the job produced, the error of its last attempt
/// included. Dropping the handle does not cancel the job.
#[derive(Debug)]
pub struct JobHandle<T, E> {
    id: JobId,
    status: StatusCell,
    receiver: oneshot::Receiver<JobOutcome<T, E>>,
}

impl<T, E> JobHandle<T, E> {
    pub(crate) fn new(id: JobId, status: StatusCell, receiver: oneshot::Receiver<JobOutcome<T, E>>) -> Self {
        Self { id, status, receiver }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status.get()
    }
}

impl<T, E> Future for JobHandle<T, E> {
    type Output = Result<T, E>;

    /// # Panics
    ///
    /// Resumes the panic of a job that panicked, and panics if the runtime
    /// dropped the job before it could finish.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.receiver).poll(cx)) {
            Ok(Ok(result)) => Poll::Ready(result),
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(_) => panic!("job {} was dropped before completing, was the runtime shut down?", self.id),
        }
    }
}
