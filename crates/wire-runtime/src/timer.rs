//! Deadline queue for sleeping and timed-out waits
//!
//! Min-heap keyed by deadline, tie-broken by insertion sequence so equal
//! deadlines fire in the order they were armed.
//!
//! Cancellation is lazy: when a task is woken early its entry stays in the
//! heap and is discarded once the caller reports the sequence as stale,
//! either at the head or in a `retain` sweep.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use wire_core::TaskId;

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, TaskId)>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline for the wait numbered `seq` of task `id`
    pub fn push(&mut self, deadline: Instant, seq: u64, id: TaskId) {
        self.heap.push(Reverse((deadline, seq, id)));
    }

    /// Earliest deadline still wanted, dropping stale heads on the way.
    ///
    /// `live(id, seq)` tells whether the wait is still outstanding.
    pub fn next_deadline(&mut self, live: impl Fn(TaskId, u64) -> bool) -> Option<Instant> {
        while let Some(Reverse((deadline, seq, id))) = self.heap.peek().copied() {
            if live(id, seq) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop one entry whose deadline is at or before `now`
    pub fn pop_expired(&mut self, now: Instant) -> Option<(TaskId, u64)> {
        match self.heap.peek() {
            Some(Reverse((deadline, _, _))) if *deadline <= now => {
                self.heap.pop().map(|Reverse((_, seq, id))| (id, seq))
            }
            _ => None,
        }
    }

    /// Keep only the entries for which `live(id, seq)` holds
    pub fn retain(&mut self, live: impl Fn(TaskId, u64) -> bool) {
        self.heap.retain(|Reverse((_, seq, id))| live(*id, *seq));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_expiry_order() {
        let base = Instant::now();
        let mut q = TimerQueue::new();
        q.push(base + Duration::from_millis(30), 1, TaskId::new(0, 0));
        q.push(base + Duration::from_millis(10), 2, TaskId::new(1, 0));
        q.push(base + Duration::from_millis(10), 3, TaskId::new(2, 0));

        assert_eq!(q.pop_expired(base), None);

        let now = base + Duration::from_millis(40);
        let fired: Vec<u64> = std::iter::from_fn(|| q.pop_expired(now)).map(|(_, s)| s).collect();
        assert_eq!(fired, vec![2, 3, 1]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_stale_heads_skipped() {
        let base = Instant::now();
        let mut q = TimerQueue::new();
        q.push(base + Duration::from_millis(1), 7, TaskId::new(0, 0));
        q.push(base + Duration::from_millis(5), 8, TaskId::new(1, 0));

        let next = q.next_deadline(|_, seq| seq != 7);
        assert_eq!(next, Some(base + Duration::from_millis(5)));
        assert_eq!(q.len(), 1);

        assert_eq!(q.next_deadline(|_, _| false), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_retain_drops_buried_entries() {
        let base = Instant::now();
        let mut q = TimerQueue::new();
        for seq in 0..10 {
            q.push(base + Duration::from_secs(60 + seq), seq, TaskId::new(seq as u32, 0));
        }

        q.retain(|_, seq| seq % 5 == 0);
        assert_eq!(q.len(), 2);
        assert_eq!(q.next_deadline(|_, _| true), Some(base + Duration::from_secs(60)));
        assert_eq!(q.pop_expired(base + Duration::from_secs(120)), Some((TaskId::new(0, 0), 0)));
        assert_eq!(q.pop_expired(base + Duration::from_secs(120)), Some((TaskId::new(5, 0), 5)));
    }
}
