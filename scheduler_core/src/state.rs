use crate::{
    queue::{PendingQueue, QueueEntry},
    task::JobStatus,
};

/// Bookkeeping of one limiter: how many jobs run and which ones wait.
///
/// Only touched under the limiter's mutex, so admission and release never
/// interleave.
#[derive(Debug)]
pub(crate) struct LimiterState {
    concurrency: usize,
    active: usize,
    pending: PendingQueue,
}

impl LimiterState {
    pub(crate) fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            active: 0,
            pending: PendingQueue::new(),
        }
    }

    pub(crate) fn enqueue(&mut self, entry: QueueEntry) {
        self.pending.publish(entry);
    }

    /// Moves jobs from the head of the queue into free slots, oldest first.
    pub(crate) fn admit_ready(&mut self) -> Vec<QueueEntry> {
        let mut admitted = Vec::new();
        while self.active < self.concurrency {
            let Some(entry) = self.pending.consume() else {
                break;
            };
            entry.status.set(JobStatus::Running);
            self.active += 1;
            admitted.push(entry);
        }
        admitted
    }

    pub(crate) fn release(&mut self) {
        debug_assert!(self.active > 0, "released a slot nobody held");
        self.active = self.active.saturating_sub(1);
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::create_entry;

    #[test]
    fn admits_up_to_concurrency() {
        let mut state = LimiterState::new(2);
        for _ in 0..5 {
            state.enqueue(create_entry());
        }

        let admitted = state.admit_ready();
        assert_eq!(admitted.len(), 2);
        assert_eq!(state.active(), 2);
        assert_eq!(state.pending(), 3);
        assert!(admitted.iter().all(|e| e.status.get() == JobStatus::Running));

        // nothing more fits until a slot frees up
        assert!(state.admit_ready().is_empty());

        state.release();
        assert_eq!(state.admit_ready().len(), 1);
        assert_eq!(state.active(), 2);
        assert_eq!(state.pending(), 2);
    }

    #[test]
    fn admission_is_fifo() {
        let mut state = LimiterState::new(1);
        let entries: Vec<_> = (0..3).map(|_| create_entry()).collect();
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        for entry in entries {
            state.enqueue(entry);
        }

        let mut order = vec![];
        loop {
            let admitted = state.admit_ready();
            if admitted.is_empty() {
                break;
            }
            order.extend(admitted.iter().map(|e| e.id));
            state.release();
        }

        assert_eq!(order, ids);
        assert_eq!(state.active(), 0);
    }

    #[test]
    fn queued_entries_stay_queued() {
        let mut state = LimiterState::new(1);
        let first = create_entry();
        let second = create_entry();
        let second_status = second.status.clone();
        state.enqueue(first);
        state.enqueue(second);

        state.admit_ready();
        assert_eq!(second_status.get(), JobStatus::Queued);
    }
}
