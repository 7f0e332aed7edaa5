//! # wire - cooperative tasks on one thread
//!
//! Tasks are plain closures with their own stacks. They run one at a time
//! on the calling thread and switch only at explicit points: `yield_now`,
//! `sleep`, or an I/O shim that would otherwise block.
//!
//! ## Quick Start
//!
//! ```ignore
//! use wire::{io, Runtime, WireConfig};
//!
//! fn main() {
//!     let rt = Runtime::new(WireConfig::default()).unwrap();
//!
//!     rt.spawn_default("hello", |w| {
//!         println!("Hello from a task!");
//!         w.yield_now();
//!         println!("Back again!");
//!     })
//!     .unwrap();
//!
//!     rt.spawn_default("reader", |w| {
//!         let mut buf = [0u8; 64];
//!         let n = io::read(w, 0, &mut buf).unwrap();
//!         println!("read {} bytes", n);
//!     })
//!     .unwrap();
//!
//!     let stats = rt.run().unwrap();
//!     println!("{}", stats);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Task code                              │
//! │         yield_now(), sleep(), io::read(), io::accept4()     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      wire-io shims                          │
//! │        would-block ──▶ wait_fd(fd, interest) ──▶ retry      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Scheduler (wire-runtime)                  │
//! │    FIFO ready queue, deadline queue, epoll, context switch  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use wire_core::{
    Interest,
    Readiness,
    StackError,
    TaskId,
    TaskState,
    WireError,
    WireResult,
};

// Re-export kprint macros for debug logging
pub use wire_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use wire_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use wire_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use wire_runtime::{
    ConfigError,
    EpollPoller,
    PollOutcome,
    Poller,
    RunStats,
    Runtime,
    Stack,
    Wire,
    WireConfig,
};

/// Cooperative I/O shims
pub use wire_io as io;

/// Run `f` as the first task of a fresh runtime configured from the
/// environment, then drive the runtime until every task has finished.
///
/// ```ignore
/// wire::block_on(|w| {
///     w.spawn_default("child", |_| println!("child")).unwrap();
///     println!("main");
/// })
/// .unwrap();
/// ```
pub fn block_on<F>(f: F) -> WireResult<RunStats>
where
    F: FnOnce(&Wire) + 'static,
{
    let rt = Runtime::from_env()?;
    rt.spawn_default("main", f)?;
    rt.run()
}
