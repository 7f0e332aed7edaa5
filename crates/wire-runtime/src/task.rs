//! Task control blocks and the slot table that owns them

use std::any::Any;
use std::cell::{Cell, UnsafeCell};

use wire_core::{Readiness, TaskId, TaskState, WaitRecord};

use crate::arch::{init_context, EntryFn, SavedRegs};
use crate::scheduler::Wire;
use crate::stack::Stack;

/// Body of a task, run once on its own stack
pub(crate) type TaskEntry = Box<dyn FnOnce(&Wire) + 'static>;

/// One task: its saved context, its stack and its wait bookkeeping.
///
/// Boxed and never moved once created; the saved registers and the
/// trampoline argument point into it.
pub(crate) struct Task {
    id: TaskId,
    name: String,
    pub(crate) state: Cell<TaskState>,
    pub(crate) regs: UnsafeCell<SavedRegs>,
    pub(crate) entry: Cell<Option<TaskEntry>>,
    pub(crate) wait: Cell<Option<WaitRecord>>,
    pub(crate) wake: Cell<Readiness>,
    pub(crate) dispatches: Cell<u64>,
    pub(crate) panic: Cell<Option<Box<dyn Any + Send>>>,
    /// Owning context, refreshed on every dispatch
    pub(crate) wire: Cell<*const Wire>,
    stack: Stack,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        stack: Stack,
        entry: TaskEntry,
        main: EntryFn,
    ) -> Box<Task> {
        let task = Box::new(Task {
            id,
            name,
            state: Cell::new(TaskState::Ready),
            regs: UnsafeCell::new(SavedRegs::default()),
            entry: Cell::new(Some(entry)),
            wait: Cell::new(None),
            wake: Cell::new(Readiness::Ready),
            dispatches: Cell::new(0),
            panic: Cell::new(None),
            wire: Cell::new(std::ptr::null()),
            stack,
        });

        // SAFETY: regs lives inside the box and the stack is mapped for as
        // long as the task exists.
        unsafe {
            init_context(
                task.regs.get(),
                task.stack.top(),
                main as usize,
                &*task as *const Task as usize,
            );
        }

        task
    }

    #[inline]
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Move to `next`; an illegal transition is caught in debug builds
    #[inline]
    pub(crate) fn set_state(&self, next: TaskState) {
        let cur = self.state.get();
        debug_assert!(
            cur.can_transition_to(next),
            "task {}: illegal transition {} -> {}",
            self.id,
            cur,
            next
        );
        self.state.set(next);
    }

    /// Sequence number of the outstanding wait, if any
    #[inline]
    pub(crate) fn wait_seq(&self) -> Option<u64> {
        self.wait.get().map(|w| w.seq)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slab of tasks addressed by generational `TaskId`s.
///
/// Freed slots are reused with a bumped generation, so ids of finished
/// tasks never resolve to a later occupant.
pub(crate) struct TaskTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> TaskTable<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store the value built for the next id and return that id
    pub(crate) fn insert(&mut self, make: impl FnOnce(TaskId) -> T) -> TaskId {
        let id = match self.free.pop() {
            Some(slot) => TaskId::new(slot, self.slots[slot as usize].generation),
            None => {
                let slot = self.slots.len() as u32;
                assert!(slot != u32::MAX, "task table full");
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                TaskId::new(slot, 0)
            }
        };

        self.slots[id.as_usize()].value = Some(make(id));
        self.live += 1;
        id
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<&T> {
        let slot = self.slots.get(id.as_usize())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<T> {
        let slot = self.slots.get_mut(id.as_usize())?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot());
        self.live -= 1;
        Some(value)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn never_entered(_: usize) -> ! {
        std::process::abort()
    }

    fn idle_task() -> Box<Task> {
        let stack = Stack::new(16 * 1024).unwrap();
        Task::new(TaskId::new(0, 0), "idle".into(), stack, Box::new(|_: &Wire| {}), never_entered)
    }

    #[test]
    fn test_legal_transitions() {
        let task = idle_task();
        for next in [
            TaskState::Running,
            TaskState::Blocked,
            TaskState::Ready,
            TaskState::Running,
            TaskState::Done,
        ] {
            task.set_state(next);
        }
        assert_eq!(task.state.get(), TaskState::Done);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "illegal transition DONE -> RUNNING"))]
    fn test_done_task_cannot_run_again() {
        let task = idle_task();
        task.set_state(TaskState::Running);
        task.set_state(TaskState::Done);
        task.set_state(TaskState::Running);
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = TaskTable::with_capacity(4);
        let a = table.insert(|_| "a");
        let b = table.insert(|_| "b");

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));

        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.get(a), None);
        assert_eq!(table.remove(a), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut table = TaskTable::with_capacity(1);
        let old = table.insert(|_| 1);
        table.remove(old);

        let new = table.insert(|id| id.generation());
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new, old);
        assert_eq!(table.get(new), Some(&1));
        assert_eq!(table.get(old), None);
    }

    #[test]
    fn test_make_sees_issued_id() {
        let mut table = TaskTable::with_capacity(0);
        let id = table.insert(|id| id);
        assert_eq!(table.get(id), Some(&id));
        assert_eq!(table.len(), 1);
    }
}
