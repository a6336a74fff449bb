use std::{collections::VecDeque, fmt, future::Future, pin::Pin};

use crate::task::{JobId, StatusCell};

/// Hands the finished job's result to its caller. The runner calls it only
/// after the slot is released, so callers never observe a stale active count.
pub(crate) type Deliver = Box<dyn FnOnce() + Send>;

/// A job with its retry config and result sink already bound in.
pub(crate) type BoxedJob = Pin<Box<dyn Future<Output = Deliver> + Send>>;

pub(crate) struct QueueEntry {
    pub(crate) id: JobId,
    pub(crate) status: StatusCell,
    pub(crate) job: BoxedJob,
}

impl QueueEntry {
    pub(crate) fn new(id: JobId, status: StatusCell, job: BoxedJob) -> Self {
        Self { id, status, job }
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("id", &self.id)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

/// FIFO of jobs waiting for a free slot.
#[derive(Debug)]
pub(crate) struct PendingQueue {
    entries: VecDeque<QueueEntry>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    pub(crate) fn publish(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub(crate) fn consume(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn create_entry() -> QueueEntry {
        let job: BoxedJob = Box::pin(async { Box::new(|| {}) as Deliver });
        QueueEntry::new(JobId::new(), StatusCell::new(), job)
    }

    #[test]
    fn publish_and_consume_entry() {
        let mut queue = PendingQueue::new();
        let entry = create_entry();
        let entry_id = entry.id;

        queue.publish(entry);
        assert_eq!(queue.len(), 1);

        let consumed = queue.consume().expect("Should get something from the queue");
        assert_eq!(consumed.id, entry_id, "Job IDs should match");
        assert_eq!(queue.len(), 0);
        assert!(queue.consume().is_none());
    }

    #[test]
    fn consumes_in_publish_order() {
        let mut queue = PendingQueue::new();
        let ids: Vec<_> = (0..5)
            .map(|_| {
                let entry = create_entry();
                let id = entry.id;
                queue.publish(entry);
                id
            })
            .collect();

        let mut received = vec![];
        while let Some(entry) = queue.consume() {
            received.push(entry.id);
        }

        assert_eq!(received, ids, "entries should come out in the order they went in");
    }
}
