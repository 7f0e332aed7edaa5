//! Yield throughput benchmark
//!
//! Spawns a handful of tasks that share one countdown. Each task takes a
//! step and yields until the countdown reaches zero, so every step is one
//! full trip through the scheduler.
//!
//! Usage:
//!     cargo run --release -p wire-bench -- [steps]
//!
//! # Environment Variables
//!
//! - `WIRE_BENCH_TASKS=<n>` - Number of tasks sharing the countdown (default 2)
//! - `WIRE_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use wire::{env_get, kinfo, RunStats, Runtime, Stack, WireConfig, WireResult};

const DEFAULT_STEPS: u64 = 100_000_000;
const DEFAULT_TASKS: usize = 2;
const TASK_STACK_SIZE: usize = 16 * 1024;

struct Report {
    steps: u64,
    elapsed: Duration,
    stats: RunStats,
}

impl Report {
    fn yields_per_sec(&self) -> f64 {
        self.stats.yields as f64 / self.elapsed.as_secs_f64().max(f64::MIN_POSITIVE)
    }
}

fn countdown(tasks: usize, steps: u64) -> WireResult<Report> {
    let rt = Runtime::new(WireConfig::new())?;
    let remaining = Rc::new(Cell::new(steps));

    for i in 0..tasks {
        let remaining = remaining.clone();
        rt.spawn(format!("counter-{}", i), Stack::new(TASK_STACK_SIZE)?, move |w| {
            while remaining.get() > 0 {
                remaining.set(remaining.get() - 1);
                w.yield_now();
            }
        });
    }

    let start = Instant::now();
    let stats = rt.run()?;
    let elapsed = start.elapsed();

    Ok(Report { steps, elapsed, stats })
}

fn main() {
    wire::init_logging();

    let steps = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_STEPS);
    let tasks = env_get("WIRE_BENCH_TASKS", DEFAULT_TASKS).max(1);

    println!("=== Wire Yield Benchmark ===\n");
    kinfo!("{} tasks, {} steps", tasks, steps);

    let report = match countdown(tasks, steps) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("bench: {}", e);
            std::process::exit(1);
        }
    };

    println!("  Tasks:       {}", tasks);
    println!("  Steps:       {}", report.steps);
    println!("  Yields:      {}", report.stats.yields);
    println!("  Total time:  {:?}", report.elapsed);
    println!(
        "  Per yield:   {:.1} ns",
        report.elapsed.as_nanos() as f64 / report.stats.yields.max(1) as f64
    );
    println!("  Rate:        {:.0} yields/sec", report.yields_per_sec());
    println!("\n{}", report.stats);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_two_tasks() {
        let report = countdown(2, 10_000).unwrap();
        assert_eq!(report.stats.yields, 10_000);
        assert_eq!(report.stats.completed, 2);
        assert!(report.yields_per_sec() > 0.0);
    }

    #[test]
    fn test_countdown_zero_steps() {
        let report = countdown(3, 0).unwrap();
        assert_eq!(report.stats.yields, 0);
        assert_eq!(report.stats.dispatches, 3);
    }
}
