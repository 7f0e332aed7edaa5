//! Ready queue for the single-thread scheduler
//!
//! Strict FIFO: tasks run in the order they became ready. A task that
//! yields goes to the back, behind everything already waiting.

use std::collections::VecDeque;

use wire_core::TaskId;

#[derive(Debug, Default)]
pub struct ReadyQueue {
    queue: VecDeque<TaskId>,
}

impl ReadyQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
        }
    }

    /// Make a task ready to run
    #[inline]
    pub fn push(&mut self, id: TaskId) {
        debug_assert!(id.is_some());
        self.queue.push_back(id);
    }

    /// Next task to run
    #[inline]
    pub fn pop(&mut self) -> Option<TaskId> {
        self.queue.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
