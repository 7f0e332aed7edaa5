//! Single-thread cooperative scheduler
//!
//! A `Wire` owns every task, the ready queue, the timer queue and the
//! poller. Tasks run on their own stacks and give control back only by
//! yielding, blocking on a descriptor, sleeping or finishing. The run loop
//! lives on the caller's stack and is the only place tasks are switched to.
//!
//! ```text
//!   run() ──pop──▶ dispatch ──switch──▶ task
//!     ▲                                   │ yield / block / finish
//!     └──────────── state dispatch ◀──switch
//! ```
//!
//! No `RefCell` borrow is ever held across a context switch.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::ops::Deref;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use wire_core::kprint::{clear_task_context, set_task_context};
use wire_core::{kdebug, kerror, kinfo, ktrace};
use wire_core::{Interest, Readiness, TaskId, TaskState, WaitRecord, WireError, WireResult};

use crate::arch::{context_switch, EntryFn, SavedRegs};
use crate::config::WireConfig;
use crate::poller::{EpollPoller, PollOutcome, Poller};
use crate::ready_queue::ReadyQueue;
use crate::stack::Stack;
use crate::task::{Task, TaskEntry, TaskTable};
use crate::timer::TimerQueue;

/// Stale timer entries tolerated before the timer heap is compacted
const TIMER_SLACK: usize = 64;

/// Counters accumulated over the life of a `Wire`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub spawned: u64,
    pub completed: u64,
    /// Context switches into a task
    pub dispatches: u64,
    pub yields: u64,
    /// Suspensions on a descriptor or timer
    pub blocks: u64,
    /// Blocked tasks made ready by the poller
    pub wakeups: u64,
    /// Blocked tasks made ready by their deadline
    pub timeouts: u64,
    /// Poller invocations
    pub polls: u64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "spawned={} completed={} dispatches={} yields={} blocks={} wakeups={} timeouts={} polls={}",
            self.spawned,
            self.completed,
            self.dispatches,
            self.yields,
            self.blocks,
            self.wakeups,
            self.timeouts,
            self.polls
        )
    }
}

/// Scheduling context. Obtained through a [`Runtime`], which keeps it at a
/// fixed address; task bodies receive it as `&Wire`.
pub struct Wire {
    config: WireConfig,
    tasks: RefCell<TaskTable<Box<Task>>>,
    ready: RefCell<ReadyQueue>,
    timers: RefCell<TimerQueue>,
    poller: RefCell<Box<dyn Poller>>,
    /// Registers of the run loop while a task is on the CPU
    sched_ctx: UnsafeCell<SavedRegs>,
    current: Cell<Option<TaskId>>,
    current_task: Cell<*const Task>,
    blocked: Cell<usize>,
    wait_seq: Cell<u64>,
    running: Cell<bool>,
    stats: Cell<RunStats>,
    /// Reused buffer for poller results
    woken: RefCell<Vec<TaskId>>,
}

/// Owner of a `Wire`.
///
/// Dereferences to the `Wire`, so `rt.spawn(..)` and `rt.run()` work
/// directly. Dropping the runtime frees every remaining task; tasks that
/// were suspended mid-body do not run their destructors.
pub struct Runtime {
    wire: Box<Wire>,
}

impl Runtime {
    /// Create a runtime backed by epoll
    pub fn new(config: WireConfig) -> WireResult<Self> {
        config.validate()?;
        let poller = EpollPoller::new(config.max_events)?;
        Self::with_poller(config, Box::new(poller))
    }

    /// Create a runtime with configuration read from `WIRE_*` variables
    pub fn from_env() -> WireResult<Self> {
        Self::new(WireConfig::from_env())
    }

    /// Create a runtime on a caller-supplied poller
    pub fn with_poller(config: WireConfig, poller: Box<dyn Poller>) -> WireResult<Self> {
        config.validate()?;
        if config.debug_logging {
            kinfo!(
                "wire: stack_size={} poll_interval={} idle_timeout={:?}",
                config.stack_size,
                config.poll_interval,
                config.idle_timeout
            );
        }

        let wire = Box::new(Wire {
            tasks: RefCell::new(TaskTable::with_capacity(config.ready_queue_capacity)),
            ready: RefCell::new(ReadyQueue::with_capacity(config.ready_queue_capacity)),
            timers: RefCell::new(TimerQueue::new()),
            poller: RefCell::new(poller),
            sched_ctx: UnsafeCell::new(SavedRegs::default()),
            current: Cell::new(None),
            current_task: Cell::new(std::ptr::null()),
            blocked: Cell::new(0),
            wait_seq: Cell::new(0),
            running: Cell::new(false),
            stats: Cell::new(RunStats::default()),
            woken: RefCell::new(Vec::with_capacity(config.max_events)),
            config,
        });
        Ok(Self { wire })
    }
}

impl Deref for Runtime {
    type Target = Wire;

    fn deref(&self) -> &Wire {
        &self.wire
    }
}

/// Clears the running flag even when a task panic unwinds out of `run`
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// First and only frame of every task stack
extern "C" fn task_main(arg: usize) -> ! {
    // SAFETY: arg is the boxed task, alive until reaped after Done
    let task = unsafe { &*(arg as *const Task) };
    let wire = unsafe { &*task.wire.get() };

    if let Some(entry) = task.entry.take() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| entry(wire))) {
            task.panic.set(Some(payload));
        }
    }

    task.set_state(TaskState::Done);
    unsafe { context_switch(task.regs.get(), wire.sched_ctx.get()) };

    kerror!("finished task {} was resumed", task.id());
    std::process::abort();
}

impl Wire {
    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    /// Create a task running `f` on `stack`. It is queued behind every
    /// task already ready. May be called from inside a running task.
    pub fn spawn<F>(&self, name: impl Into<String>, stack: Stack, f: F) -> TaskId
    where
        F: FnOnce(&Wire) + 'static,
    {
        let entry: TaskEntry = Box::new(f);
        let name = name.into();
        let id = self
            .tasks
            .borrow_mut()
            .insert(|id| Task::new(id, name, stack, entry, task_main as EntryFn));

        self.ready.borrow_mut().push(id);
        self.bump(|s| s.spawned += 1);
        if self.config.debug_logging {
            kdebug!("spawn {:?}", id);
        }
        id
    }

    /// `spawn` with a fresh stack of the configured default size
    pub fn spawn_default<F>(&self, name: impl Into<String>, f: F) -> WireResult<TaskId>
    where
        F: FnOnce(&Wire) + 'static,
    {
        let stack = Stack::new(self.config.stack_size)?;
        Ok(self.spawn(name, stack, f))
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Run until no task is ready or blocked.
    ///
    /// Returns the accumulated counters. A task panic is re-raised here
    /// after the task has been reaped.
    pub fn run(&self) -> WireResult<RunStats> {
        if self.running.get() {
            return Err(WireError::AlreadyRunning);
        }
        self.running.set(true);
        let _guard = RunningGuard(&self.running);

        let interval = self.config.poll_interval.max(1);
        let mut since_poll = 0u32;

        loop {
            // Tasks that yield forever must not starve blocked ones
            if self.blocked.get() > 0 {
                since_poll += 1;
                if since_poll >= interval {
                    since_poll = 0;
                    self.poll(false)?;
                }
            }

            let next = self.ready.borrow_mut().pop();
            match next {
                Some(id) => self.dispatch(id)?,
                None if self.blocked.get() == 0 => break,
                None => {
                    since_poll = 0;
                    self.poll(true)?;
                }
            }
        }

        let stats = self.stats();
        if self.config.debug_logging {
            kinfo!("run finished: {}", stats);
        }
        Ok(stats)
    }

    fn dispatch(&self, id: TaskId) -> WireResult<()> {
        let task_ptr: *const Task = match self.tasks.borrow().get(id) {
            Some(task) => &**task,
            None => return Err(WireError::ResumedFinished(id)),
        };
        // SAFETY: tasks are boxed and only freed by reap() below
        let task = unsafe { &*task_ptr };

        let state = task.state.get();
        if !state.is_runnable() {
            return Err(if state.is_terminated() {
                WireError::ResumedFinished(id)
            } else {
                WireError::InvalidState(id, state)
            });
        }

        task.set_state(TaskState::Running);
        task.wire.set(self);
        task.dispatches.set(task.dispatches.get() + 1);
        self.current.set(Some(id));
        self.current_task.set(task_ptr);
        self.bump(|s| s.dispatches += 1);
        set_task_context(id.slot());
        if self.config.debug_logging {
            ktrace!("dispatch {:?} ({})", id, task.name());
        }

        unsafe { context_switch(self.sched_ctx.get(), task.regs.get()) };

        clear_task_context();
        self.current.set(None);
        self.current_task.set(std::ptr::null());

        match task.state.get() {
            TaskState::Ready => self.ready.borrow_mut().push(id),
            TaskState::Blocked => self.blocked.set(self.blocked.get() + 1),
            TaskState::Done => self.reap(id),
            TaskState::Running => return Err(WireError::InvalidState(id, TaskState::Running)),
        }
        Ok(())
    }

    fn reap(&self, id: TaskId) {
        let Some(task) = self.tasks.borrow_mut().remove(id) else {
            return;
        };
        self.bump(|s| s.completed += 1);
        if self.config.debug_logging {
            kdebug!(
                "task {:?} ({}) done after {} dispatches",
                id,
                task.name(),
                task.dispatches.get()
            );
        }

        if let Some(payload) = task.panic.take() {
            drop(task);
            panic::resume_unwind(payload);
        }
    }

    // ------------------------------------------------------------------
    // Called from inside a task
    // ------------------------------------------------------------------

    fn running_task(&self, op: &str) -> &Task {
        let ptr = self.current_task.get();
        if ptr.is_null() {
            panic!("{} called outside a running task", op);
        }
        // SAFETY: the running task cannot be reaped while it runs
        unsafe { &*ptr }
    }

    #[inline]
    fn switch_to_scheduler(&self, task: &Task) {
        unsafe { context_switch(task.regs.get(), self.sched_ctx.get()) };
    }

    /// Give up the CPU; the task runs again after every task that is
    /// already ready.
    ///
    /// # Panics
    ///
    /// When called outside a running task.
    pub fn yield_now(&self) {
        let task = self.running_task("yield_now");
        task.set_state(TaskState::Ready);
        self.bump(|s| s.yields += 1);
        self.switch_to_scheduler(task);
    }

    fn block_current(&self, task: &Task, record: WaitRecord) -> Readiness {
        task.wait.set(Some(record));
        task.wake.set(Readiness::Ready);
        if let Some(deadline) = record.deadline {
            self.timers.borrow_mut().push(deadline, record.seq, task.id());
        }
        task.set_state(TaskState::Blocked);
        self.bump(|s| s.blocks += 1);

        self.switch_to_scheduler(task);
        task.wake.get()
    }

    fn next_seq(&self) -> u64 {
        let seq = self.wait_seq.get().wrapping_add(1);
        self.wait_seq.set(seq);
        seq
    }

    /// Suspend the current task until `fd` is ready for `interest` or
    /// `timeout` elapses.
    ///
    /// Fails without suspending when the poller refuses the descriptor
    /// (regular files under epoll, closed descriptors).
    ///
    /// # Panics
    ///
    /// When called outside a running task.
    pub fn wait_fd(&self, fd: RawFd, interest: Interest, timeout: Option<Duration>) -> WireResult<Readiness> {
        let task = self.running_task("wait_fd");
        self.poller.borrow_mut().register_interest(fd, interest, task.id())?;

        let deadline = timeout.map(|d| Instant::now() + d);
        let record = WaitRecord::fd(fd, interest, deadline, self.next_seq());
        Ok(self.block_current(task, record))
    }

    /// Suspend the current task for at least `duration`
    ///
    /// # Panics
    ///
    /// When called outside a running task.
    pub fn sleep(&self, duration: Duration) {
        let task = self.running_task("sleep");
        let record = WaitRecord::timer(Instant::now() + duration, self.next_seq());
        self.block_current(task, record);
    }

    // ------------------------------------------------------------------
    // Waking
    // ------------------------------------------------------------------

    /// Ask the poller for ready descriptors and fire due timers.
    ///
    /// `blocking` waits for the next event, timer or idle timeout;
    /// otherwise this only collects what is ready right now.
    fn poll(&self, blocking: bool) -> WireResult<()> {
        let now = Instant::now();
        let next_timer = self
            .timers
            .borrow_mut()
            .next_deadline(|id, seq| self.wait_outstanding(id, seq))
            .map(|deadline| deadline.saturating_duration_since(now));

        // The watchdog only covers waits with no deadline
        let watchdog = blocking && next_timer.is_none() && self.config.idle_timeout.is_some();
        let timeout = if !blocking {
            Some(Duration::ZERO)
        } else if watchdog {
            self.config.idle_timeout
        } else {
            next_timer
        };

        let mut woken = std::mem::take(&mut *self.woken.borrow_mut());
        woken.clear();
        let outcome = self.poller.borrow_mut().run_once(timeout, &mut woken);
        self.bump(|s| s.polls += 1);
        let outcome = outcome?;

        let mut progressed = 0;
        for &id in &woken {
            if self.wake_fd_waiter(id) {
                progressed += 1;
            }
        }
        *self.woken.borrow_mut() = woken;
        progressed += self.expire_timers(Instant::now());
        self.compact_timers();

        if blocking && progressed == 0 {
            match outcome {
                PollOutcome::Exhausted => return Err(self.deadlock()),
                PollOutcome::TimedOut if watchdog => return Err(self.deadlock()),
                _ => {}
            }
        }
        Ok(())
    }

    fn deadlock(&self) -> WireError {
        let blocked = self.blocked.get();
        kerror!(
            "deadlock: {} task(s) blocked, {} poller registration(s), nothing ready",
            blocked,
            self.poller.borrow().pending()
        );
        WireError::Deadlock { blocked }
    }

    fn wait_outstanding(&self, id: TaskId, seq: u64) -> bool {
        self.tasks
            .borrow()
            .get(id)
            .is_some_and(|t| t.state.get() == TaskState::Blocked && t.wait_seq() == Some(seq))
    }

    /// Poller reported `id`; wake it if it is still blocked on a descriptor
    fn wake_fd_waiter(&self, id: TaskId) -> bool {
        let fd_wait = self
            .tasks
            .borrow()
            .get(id)
            .and_then(|t| t.wait.get())
            .and_then(|w| w.fd_interest())
            .is_some();
        if !fd_wait {
            return false;
        }
        self.wake(id, Readiness::Ready)
    }

    fn expire_timers(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let Some((id, seq)) = self.timers.borrow_mut().pop_expired(now) else {
                break;
            };
            if !self.wait_outstanding(id, seq) {
                continue;
            }

            let record = self.tasks.borrow().get(id).and_then(|t| t.wait.get());
            if let Some((fd, interest)) = record.and_then(|w| w.fd_interest()) {
                self.poller.borrow_mut().deregister_interest(fd, interest, id);
                self.bump(|s| s.timeouts += 1);
            }
            if self.wake(id, Readiness::TimedOut) {
                fired += 1;
            }
        }
        fired
    }

    /// Drop deadlines of waits that ended early once they outnumber the
    /// blocked tasks by more than `TIMER_SLACK`
    fn compact_timers(&self) {
        let mut timers = self.timers.borrow_mut();
        if timers.len() > 2 * self.blocked.get() + TIMER_SLACK {
            timers.retain(|id, seq| self.wait_outstanding(id, seq));
        }
    }

    fn wake(&self, id: TaskId, reason: Readiness) -> bool {
        {
            let tasks = self.tasks.borrow();
            let Some(task) = tasks.get(id) else {
                return false;
            };
            if task.state.get() != TaskState::Blocked {
                return false;
            }
            task.wait.set(None);
            task.wake.set(reason);
            task.set_state(TaskState::Ready);
        }

        self.blocked.set(self.blocked.get() - 1);
        self.ready.borrow_mut().push(id);
        if reason == Readiness::Ready {
            self.bump(|s| s.wakeups += 1);
        }
        if self.config.debug_logging {
            ktrace!("wake {:?} ({:?})", id, reason);
        }
        true
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// State of a live task; `None` once it has finished and been reaped
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.borrow().get(id).map(|t| t.state.get())
    }

    /// Id of the task on the CPU, if called from one
    pub fn current(&self) -> Option<TaskId> {
        self.current.get()
    }

    pub fn current_name(&self) -> Option<String> {
        let ptr = self.current_task.get();
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { &*ptr }.name().to_string())
    }

    pub fn stats(&self) -> RunStats {
        self.stats.get()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Tasks spawned and not yet finished
    pub fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Tasks currently blocked on a descriptor or timer
    pub fn blocked_count(&self) -> usize {
        self.blocked.get()
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    #[inline]
    fn bump(&self, f: impl FnOnce(&mut RunStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::rc::Rc;

    fn runtime() -> Runtime {
        Runtime::new(WireConfig::new().stack_size(32 * 1024)).unwrap()
    }

    fn stack() -> Stack {
        Stack::new(32 * 1024).unwrap()
    }

    fn pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(ret, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    /// Accepts every registration and never reports anything
    struct NullPoller;

    impl Poller for NullPoller {
        fn register_interest(&mut self, _: RawFd, _: Interest, _: TaskId) -> WireResult<()> {
            Ok(())
        }

        fn deregister_interest(&mut self, _: RawFd, _: Interest, _: TaskId) {}

        fn run_once(&mut self, timeout: Option<Duration>, _: &mut Vec<TaskId>) -> WireResult<PollOutcome> {
            match timeout {
                None => Ok(PollOutcome::Exhausted),
                Some(d) => {
                    std::thread::sleep(d);
                    Ok(PollOutcome::TimedOut)
                }
            }
        }

        fn pending(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_each_task_runs_once() {
        let rt = runtime();
        let counts: Vec<Rc<Cell<u32>>> = (0..10).map(|_| Rc::new(Cell::new(0))).collect();

        for count in &counts {
            let count = count.clone();
            rt.spawn("once", stack(), move |_| count.set(count.get() + 1));
        }

        let stats = rt.run().unwrap();
        assert!(counts.iter().all(|c| c.get() == 1));
        assert_eq!(stats.spawned, 10);
        assert_eq!(stats.completed, 10);
        assert_eq!(rt.task_count(), 0);
    }

    #[test]
    fn test_yield_accounting() {
        const N: u64 = 8;
        const K: u64 = 5;

        let rt = runtime();
        for _ in 0..N {
            rt.spawn("yielder", stack(), |w| {
                for _ in 0..K {
                    w.yield_now();
                }
            });
        }

        let stats = rt.run().unwrap();
        assert_eq!(stats.yields, N * K);
        assert_eq!(stats.dispatches, N * (K + 1));
        assert_eq!(stats.completed, N);
    }

    #[test]
    fn test_fifo_alternation() {
        const K: usize = 500;
        const W: usize = 16;

        let rt = runtime();
        let trace = Rc::new(RefCell::new(Vec::with_capacity(2 * K)));

        for tag in [0u8, 1] {
            let trace = trace.clone();
            rt.spawn(format!("t{}", tag), stack(), move |w| {
                for _ in 0..K {
                    trace.borrow_mut().push(tag);
                    w.yield_now();
                }
            });
        }

        rt.run().unwrap();
        let trace = trace.borrow();
        assert_eq!(trace.len(), 2 * K);
        for (i, &tag) in trace.iter().enumerate() {
            assert_eq!(tag as usize, i % 2, "out of turn at {}", i);
        }
        for window in trace.windows(2 * W) {
            let ones = window.iter().filter(|&&t| t == 1).count();
            assert!(ones.abs_diff(W) <= 1, "window skewed: {} of {}", ones, 2 * W);
        }
    }

    #[test]
    fn test_spawn_from_task() {
        let rt = runtime();
        let trace = Rc::new(RefCell::new(Vec::new()));

        let t = trace.clone();
        rt.spawn("parent", stack(), move |w| {
            let child_trace = t.clone();
            w.spawn("child", Stack::new(16 * 1024).unwrap(), move |_| {
                child_trace.borrow_mut().push("child");
            });
            t.borrow_mut().push("parent-before");
            w.yield_now();
            t.borrow_mut().push("parent-after");
        });

        let stats = rt.run().unwrap();
        assert_eq!(*trace.borrow(), vec!["parent-before", "child", "parent-after"]);
        assert_eq!(stats.spawned, 2);
    }

    #[test]
    #[should_panic(expected = "called outside a running task")]
    fn test_yield_outside_task() {
        let rt = runtime();
        rt.yield_now();
    }

    #[test]
    fn test_run_reentry_rejected() {
        let rt = runtime();
        let result = Rc::new(RefCell::new(None));

        let r = result.clone();
        rt.spawn("nested", stack(), move |w| {
            assert!(w.is_running());
            *r.borrow_mut() = Some(w.run());
        });

        rt.run().unwrap();
        assert_eq!(*result.borrow(), Some(Err(WireError::AlreadyRunning)));
        assert!(!rt.is_running());
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_task_panic_propagates() {
        let rt = runtime();
        rt.spawn("bad", stack(), |_| panic!("boom"));
        let _ = rt.run();
    }

    #[test]
    fn test_panic_leaves_runtime_usable() {
        let rt = runtime();
        rt.spawn("bad", stack(), |_| panic!("boom"));
        let caught = panic::catch_unwind(AssertUnwindSafe(|| rt.run()));
        assert!(caught.is_err());
        assert!(!rt.is_running());
        assert_eq!(rt.stats().completed, 1);

        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        rt.spawn("good", stack(), move |_| r.set(true));
        rt.run().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn test_deadlock_when_nothing_pending() {
        let rt = Runtime::with_poller(WireConfig::new(), Box::new(NullPoller)).unwrap();
        rt.spawn("stuck", stack(), |w| {
            let _ = w.wait_fd(0, Interest::Readable, None);
        });

        assert_eq!(rt.run(), Err(WireError::Deadlock { blocked: 1 }));
        assert_eq!(rt.blocked_count(), 1);
    }

    #[test]
    fn test_deadlock_on_idle_timeout() {
        let config = WireConfig::new().idle_timeout(Some(Duration::from_millis(20)));
        let rt = Runtime::new(config).unwrap();
        let (r, _w) = pipe();
        let fd = r.as_raw_fd();

        rt.spawn("reader", stack(), move |w| {
            let _ = w.wait_fd(fd, Interest::Readable, None);
        });

        let started = Instant::now();
        assert_eq!(rt.run(), Err(WireError::Deadlock { blocked: 1 }));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_idle_timeout_ignores_pending_timer() {
        let config = WireConfig::new()
            .stack_size(32 * 1024)
            .idle_timeout(Some(Duration::from_millis(20)));
        let rt = Runtime::new(config).unwrap();
        let (r, _w) = pipe();
        let fd = r.as_raw_fd();
        let woke = Rc::new(Cell::new(false));
        let waited = Rc::new(RefCell::new(None));

        let flag = woke.clone();
        rt.spawn("sleeper", stack(), move |w| {
            w.sleep(Duration::from_millis(200));
            flag.set(true);
        });
        let out = waited.clone();
        rt.spawn("reader", stack(), move |w| {
            *out.borrow_mut() = Some(w.wait_fd(fd, Interest::Readable, Some(Duration::from_millis(100))));
        });

        let started = Instant::now();
        rt.run().unwrap();
        assert!(woke.get());
        assert_eq!(*waited.borrow(), Some(Ok(Readiness::TimedOut)));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_stale_ready_entry_rejected() {
        let rt = runtime();
        let id = rt.spawn("once", stack(), |_| {});
        rt.ready.borrow_mut().push(id);

        assert_eq!(rt.run(), Err(WireError::ResumedFinished(id)));
        assert_eq!(rt.state(id), None);
    }

    #[test]
    fn test_blocked_task_not_dispatched() {
        let rt = runtime();
        let sleeper = rt.spawn("sleeper", stack(), |w| w.sleep(Duration::from_millis(50)));
        rt.spawn("meddler", stack(), move |w| w.ready.borrow_mut().push(sleeper));

        assert_eq!(rt.run(), Err(WireError::InvalidState(sleeper, TaskState::Blocked)));
    }

    #[test]
    fn test_timers_compacted_after_early_wakes() {
        const ROUNDS: usize = 200;

        let rt = runtime();
        let (r, w_end) = pipe();
        let (rfd, wfd) = (r.as_raw_fd(), w_end.as_raw_fd());
        let heap_len = Rc::new(Cell::new(usize::MAX));

        let out = heap_len.clone();
        rt.spawn("reader", stack(), move |w| {
            let mut byte = [0u8; 1];
            for _ in 0..ROUNDS {
                assert_eq!(unsafe { libc::write(wfd, b"x".as_ptr().cast(), 1) }, 1);
                let got = w.wait_fd(rfd, Interest::Readable, Some(Duration::from_secs(60)));
                assert_eq!(got, Ok(Readiness::Ready));
                assert_eq!(unsafe { libc::read(rfd, byte.as_mut_ptr().cast(), 1) }, 1);
            }
            out.set(w.timers.borrow().len());
        });

        let stats = rt.run().unwrap();
        assert_eq!(stats.blocks, ROUNDS as u64);
        assert!(heap_len.get() <= TIMER_SLACK + 2, "{} stale timers left", heap_len.get());
    }

    #[test]
    fn test_wait_fd_wakes_only_target() {
        let rt = runtime();
        let (ra, wa) = pipe();
        let (rb, _wb) = pipe();
        let (fd_a, fd_b) = (ra.as_raw_fd(), rb.as_raw_fd());
        let results = Rc::new(RefCell::new(Vec::new()));

        let res = results.clone();
        rt.spawn("a", stack(), move |w| {
            let got = w.wait_fd(fd_a, Interest::Readable, Some(Duration::from_secs(5)));
            res.borrow_mut().push(("a", got));
        });
        let res = results.clone();
        rt.spawn("b", stack(), move |w| {
            let got = w.wait_fd(fd_b, Interest::Readable, Some(Duration::from_millis(30)));
            res.borrow_mut().push(("b", got));
        });
        rt.spawn("writer", stack(), move |_| {
            let ret = unsafe { libc::write(wa.as_raw_fd(), b"x".as_ptr().cast(), 1) };
            assert_eq!(ret, 1);
        });

        let stats = rt.run().unwrap();
        assert_eq!(
            *results.borrow(),
            vec![("a", Ok(Readiness::Ready)), ("b", Ok(Readiness::TimedOut))]
        );
        assert_eq!(stats.wakeups, 1);
        assert_eq!(stats.timeouts, 1);
    }

    #[test]
    fn test_wait_fd_refused() {
        let rt = runtime();
        let file = std::fs::File::open("/proc/self/exe").unwrap();
        let fd = file.as_raw_fd();
        let result = Rc::new(RefCell::new(None));

        let r = result.clone();
        rt.spawn("file", stack(), move |w| {
            *r.borrow_mut() = Some(w.wait_fd(fd, Interest::Readable, None));
        });

        let stats = rt.run().unwrap();
        assert_eq!(*result.borrow(), Some(Err(WireError::Poll(libc::EPERM))));
        assert_eq!(stats.blocks, 0);
    }

    #[test]
    fn test_sleep_ordering() {
        let rt = runtime();
        let order = Rc::new(RefCell::new(Vec::new()));

        for ms in [30u64, 10, 20] {
            let order = order.clone();
            rt.spawn(format!("sleep{}", ms), stack(), move |w| {
                w.sleep(Duration::from_millis(ms));
                order.borrow_mut().push(ms);
            });
        }

        let started = Instant::now();
        rt.run().unwrap();
        assert_eq!(*order.borrow(), vec![10, 20, 30]);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_blocked_not_starved_by_yielders() {
        let config = WireConfig::new().stack_size(32 * 1024).poll_interval(4);
        let rt = Runtime::new(config).unwrap();
        let (r, w) = pipe();
        let fd = r.as_raw_fd();
        let woke = Rc::new(Cell::new(false));

        let flag = woke.clone();
        rt.spawn("reader", stack(), move |wire| {
            wire.wait_fd(fd, Interest::Readable, None).unwrap();
            flag.set(true);
        });
        let flag = woke.clone();
        rt.spawn("spinner", stack(), move |wire| {
            let ret = unsafe { libc::write(w.as_raw_fd(), b"x".as_ptr().cast(), 1) };
            assert_eq!(ret, 1);
            let mut spins = 0;
            while !flag.get() {
                wire.yield_now();
                spins += 1;
                assert!(spins < 100, "reader starved");
            }
        });

        rt.run().unwrap();
        assert!(woke.get());
    }

    #[test]
    fn test_state_and_identity() {
        let rt = runtime();
        let seen = Rc::new(RefCell::new(None));

        let s = seen.clone();
        let id = rt
            .spawn_default("named", move |w| {
                *s.borrow_mut() = Some((w.current(), w.current_name()));
            })
            .unwrap();

        assert_eq!(rt.state(id), Some(TaskState::Ready));
        assert_eq!(rt.current(), None);
        rt.run().unwrap();

        assert_eq!(*seen.borrow(), Some((Some(id), Some("named".to_string()))));
        assert_eq!(rt.state(id), None);
    }

    #[test]
    fn test_empty_run() {
        let rt = runtime();
        assert_eq!(rt.run().unwrap(), RunStats::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Runtime::new(WireConfig::new().poll_interval(0)).err();
        assert_eq!(err, Some(WireError::InvalidConfig("poll_interval must be > 0")));
    }
}
