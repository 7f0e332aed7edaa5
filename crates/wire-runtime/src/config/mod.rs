//! Wire configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. User's config file named by `WIRE_CONFIG_RS` (compile-time, `custom-config` feature)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use wire_runtime::config::WireConfig;
//!
//! let config = WireConfig::from_env()
//!     .stack_size(128 * 1024)
//!     .idle_timeout(Some(Duration::from_secs(5)));
//! ```

/// Defaults generated by build.rs
pub mod defaults {
    include!(concat!(env!("OUT_DIR"), "/wire_defaults.rs"));
}

use std::time::Duration;

use wire_core::constants::MIN_STACK_SIZE;
use wire_core::env::{env_get, env_get_bool};

/// Runtime configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Usable stack size for `spawn_default`
    pub stack_size: usize,
    /// Events fetched per poller call
    pub max_events: usize,
    /// Initial ready queue capacity
    pub ready_queue_capacity: usize,
    /// Dispatches between non-blocking polls while tasks are blocked
    pub poll_interval: u32,
    /// Report a deadlock when the poller sees nothing for this long
    /// while every task is blocked. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Log every dispatch/block/wake at debug level
    pub debug_logging: bool,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl WireConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `WIRE_STACK_SIZE` - Stack size in bytes
    /// - `WIRE_MAX_EVENTS` - Poller batch size
    /// - `WIRE_READY_QUEUE_CAPACITY` - Initial ready queue capacity
    /// - `WIRE_POLL_INTERVAL` - Dispatches between non-blocking polls
    /// - `WIRE_IDLE_TIMEOUT_MS` - Deadlock watchdog in ms (0 = off)
    /// - `WIRE_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        let idle_ms: u64 = env_get("WIRE_IDLE_TIMEOUT_MS", defaults::IDLE_TIMEOUT_MS);
        Self {
            stack_size: env_get("WIRE_STACK_SIZE", defaults::STACK_SIZE),
            max_events: env_get("WIRE_MAX_EVENTS", defaults::MAX_EVENTS),
            ready_queue_capacity: env_get(
                "WIRE_READY_QUEUE_CAPACITY",
                defaults::READY_QUEUE_CAPACITY,
            ),
            poll_interval: env_get("WIRE_POLL_INTERVAL", defaults::POLL_INTERVAL),
            idle_timeout: (idle_ms > 0).then(|| Duration::from_millis(idle_ms)),
            debug_logging: env_get_bool(
                "WIRE_DEBUG",
                defaults::DEBUG_LOGGING || cfg!(feature = "debug-logging"),
            ),
        }
    }

    /// Create config with compile-time defaults only (no env override).
    pub fn new() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            max_events: defaults::MAX_EVENTS,
            ready_queue_capacity: defaults::READY_QUEUE_CAPACITY,
            poll_interval: defaults::POLL_INTERVAL,
            idle_timeout: (defaults::IDLE_TIMEOUT_MS > 0)
                .then(|| Duration::from_millis(defaults::IDLE_TIMEOUT_MS)),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn ready_queue_capacity(mut self, cap: usize) -> Self {
        self.ready_queue_capacity = cap;
        self
    }

    pub fn poll_interval(mut self, n: u32) -> Self {
        self.poll_interval = n;
        self
    }

    pub fn idle_timeout(mut self, d: Option<Duration>) -> Self {
        self.idle_timeout = d;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 4KB"));
        }
        if self.max_events == 0 {
            return Err(ConfigError::InvalidValue("max_events must be > 0"));
        }
        if self.max_events > i32::MAX as usize {
            return Err(ConfigError::InvalidValue("max_events must fit in an i32"));
        }
        if self.ready_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("ready_queue_capacity must be > 0"));
        }
        if self.poll_interval == 0 {
            return Err(ConfigError::InvalidValue("poll_interval must be > 0"));
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue("idle_timeout must be non-zero when set"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Wire Configuration:");
        eprintln!("  stack_size:            {}", self.stack_size);
        eprintln!("  max_events:            {}", self.max_events);
        eprintln!("  ready_queue_capacity:  {}", self.ready_queue_capacity);
        eprintln!("  poll_interval:         {}", self.poll_interval);
        eprintln!("  idle_timeout:          {:?}", self.idle_timeout);
        eprintln!("  debug_logging:         {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for wire_core::WireError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => wire_core::WireError::InvalidConfig(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = WireConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.stack_size, defaults::STACK_SIZE);
    }

    #[test]
    fn test_builder() {
        let config = WireConfig::new()
            .stack_size(128 * 1024)
            .poll_interval(4)
            .idle_timeout(Some(Duration::from_millis(50)));

        assert_eq!(config.stack_size, 128 * 1024);
        assert_eq!(config.poll_interval, 4);
        assert_eq!(config.idle_timeout, Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_validation() {
        assert!(WireConfig::new().stack_size(512).validate().is_err());
        assert!(WireConfig::new().max_events(0).validate().is_err());
        assert!(WireConfig::new().poll_interval(0).validate().is_err());
        assert!(WireConfig::new()
            .idle_timeout(Some(Duration::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_error_into_wire_error() {
        let err = WireConfig::new().max_events(0).validate().unwrap_err();
        let wire: wire_core::WireError = err.into();
        assert_eq!(wire, wire_core::WireError::InvalidConfig("max_events must be > 0"));
    }
}
