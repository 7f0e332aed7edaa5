//! # wire-runtime
//!
//! Single-thread cooperative scheduler for wire tasks.
//!
//! This crate provides:
//! - Stack allocation (mmap with a guard page)
//! - Context switching (architecture-specific assembly)
//! - The FIFO ready queue and the deadline queue
//! - The readiness poller (epoll)
//! - `Runtime` / `Wire`, the scheduling context tasks run under

pub mod arch;
pub mod config;
pub mod poller;
pub mod ready_queue;
pub mod scheduler;
pub mod stack;
pub mod timer;

mod task;

// Re-exports
pub use config::{ConfigError, WireConfig};
pub use poller::{EpollPoller, PollOutcome, Poller};
pub use scheduler::{RunStats, Runtime, Wire};
pub use stack::Stack;

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(not(target_os = "linux"))] {
        compile_error!("wire-runtime requires Linux (epoll)");
    }
}
