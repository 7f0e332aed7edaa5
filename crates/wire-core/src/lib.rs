//! # wire-core
//!
//! Core types for the wire cooperative task runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The scheduler, stacks, context switching and the poller live in
//! `wire-runtime`.
//!
//! ## Modules
//!
//! - `id` - Task identifier type
//! - `state` - Task state enum
//! - `wait` - Wait records, interest directions, wake reasons
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod wait;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::TaskId;
pub use state::TaskState;
pub use wait::{Interest, Readiness, WaitCondition, WaitRecord};
pub use error::{StackError, WireError, WireResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

/// Constants for stack layout and scheduling
pub mod constants {
    /// Guard page size (4 KB), kept PROT_NONE below every stack
    pub const GUARD_SIZE: usize = 4096;

    /// Smallest stack the allocator hands out.
    ///
    /// This is not a safety bound: an entry routine deeper than its stack
    /// faults on the guard page.
    pub const MIN_STACK_SIZE: usize = 4096;

    /// Stack alignment required by both supported ABIs
    pub const STACK_ALIGN: usize = 16;

    /// No task sentinel value
    pub const TASK_NONE: u32 = u32::MAX;
}
