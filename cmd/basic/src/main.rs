//! Basic wire example
//!
//! Spawns a few yielding tasks, a sleeper, and a pipe reader/writer pair so
//! the three ways a task gives up the CPU show up in one run.
//!
//! # Environment Variables
//!
//! - `WIRE_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `WIRE_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `WIRE_DEBUG=1` - Scheduler spawn/dispatch/wake tracing

use std::os::fd::AsRawFd;
use std::time::Duration;

use wire::{io, kdebug, kinfo, Runtime, WireConfig};

// WIRE_LOG_LEVEL=debug WIRE_FLUSH_EPRINT=1 cargo run -p wire-basic
fn main() {
    println!("=== Wire Basic Example ===\n");

    // Reads WIRE_FLUSH_EPRINT and WIRE_LOG_LEVEL
    wire::init_logging();

    let config = WireConfig::from_env();
    config.print();

    let rt = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("basic: {}", e);
            std::process::exit(1);
        }
    };

    // Three yielders interleave round-robin
    for i in 1..=3 {
        let id = rt
            .spawn_default(format!("yielder-{}", i), move |w| {
                for j in 0..3 {
                    kdebug!("[yielder {}] iteration {}", i, j);
                    w.yield_now();
                }
                kdebug!("[yielder {}] finished", i);
            })
            .unwrap();
        println!("Spawned yielder {} (ID={})", i, id);
    }

    rt.spawn_default("sleeper", |w| {
        kinfo!("sleeping 50ms");
        w.sleep(Duration::from_millis(50));
        kinfo!("awake");
    })
    .unwrap();

    // The reader parks on the empty pipe until the writer runs
    let (reader, writer) = std::io::pipe().unwrap();
    io::set_nonblocking(reader.as_raw_fd()).unwrap();
    io::set_nonblocking(writer.as_raw_fd()).unwrap();

    rt.spawn_default("reader", move |w| {
        let mut buf = [0u8; 64];
        match io::read(w, reader.as_raw_fd(), &mut buf) {
            Ok(n) => kinfo!("read {:?}", String::from_utf8_lossy(&buf[..n])),
            Err(e) => kinfo!("read failed: {}", e),
        }
    })
    .unwrap();

    rt.spawn_default("writer", move |w| {
        w.sleep(Duration::from_millis(10));
        if let Err(e) = io::write(w, writer.as_raw_fd(), b"hello through the pipe") {
            kinfo!("write failed: {}", e);
        }
    })
    .unwrap();

    match rt.run() {
        Ok(stats) => println!("\n{}", stats),
        Err(e) => {
            eprintln!("basic: {}", e);
            std::process::exit(1);
        }
    }

    println!("\n=== Example Complete ===");
}
