//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `WireConfig::from_env` and the
//! commands under `cmd/`.
//!
//! ```ignore
//! use wire_core::env::{env_get, env_get_bool};
//!
//! let stack: usize = env_get("WIRE_STACK_SIZE", 64 * 1024);
//! let debug = env_get_bool("WIRE_DEBUG", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as `T`, or `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" (any case) are true, anything else set is false.
/// Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if set and parses, `None` otherwise
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable names; the harness runs tests in parallel.

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__WIRE_TEST_UNSET_A__", 42);
        assert_eq!(val, 42);
        assert!(env_get_opt::<u64>("__WIRE_TEST_UNSET_A__").is_none());
        assert_eq!(env_get_str("__WIRE_TEST_UNSET_A__", "x"), "x");
        assert!(!env_is_set("__WIRE_TEST_UNSET_A__"));
    }

    #[test]
    fn test_env_get_parsed() {
        std::env::set_var("__WIRE_TEST_NUM__", " 123 ");
        let val: usize = env_get("__WIRE_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__WIRE_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__WIRE_TEST_BAD__", "sixty-four");
        let val: usize = env_get("__WIRE_TEST_BAD__", 64);
        assert_eq!(val, 64);
        std::env::remove_var("__WIRE_TEST_BAD__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (raw, want) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("nope", false)] {
            std::env::set_var("__WIRE_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__WIRE_TEST_BOOL__", !want), want, "{}", raw);
        }
        std::env::remove_var("__WIRE_TEST_BOOL__");
        assert!(env_get_bool("__WIRE_TEST_BOOL__", true));
    }
}
