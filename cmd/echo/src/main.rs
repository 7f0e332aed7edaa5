//! Wire Echo Server
//!
//! Single-threaded TCP echo server. One task accepts; every connection gets
//! its own task that reads and writes back with ordinary blocking-style calls.
//!
//! Usage:
//!     cargo build --release -p wire-echo
//!     ./target/release/echo [port] [max_conns]
//!
//! `max_conns` stops the server after that many connections have closed
//! (0 or absent: serve forever).
//!
//! Test with:
//!     echo "hello" | nc localhost 9999

use std::cell::Cell;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use wire::io::{WireListener, WireStream};
use wire::{kdebug, kerror, kinfo, Runtime, Wire, WireConfig};

const DEFAULT_PORT: u16 = 9999;
const BUF_SIZE: usize = 4096;

#[derive(Debug, Default)]
struct Stats {
    accepts: Cell<u64>,
    closes: Cell<u64>,
    bytes: Cell<u64>,
    errors: Cell<u64>,
}

fn bump(c: &Cell<u64>, n: u64) {
    c.set(c.get() + n);
}

fn serve_conn(w: &Wire, stream: WireStream, stats: &Stats) {
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = match stream.read(w, &mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                kdebug!("recv: {}", e);
                bump(&stats.errors, 1);
                break;
            }
        };
        if let Err(e) = stream.write_all(w, &buf[..n]) {
            kdebug!("send: {}", e);
            bump(&stats.errors, 1);
            break;
        }
        bump(&stats.bytes, n as u64);
    }
    bump(&stats.closes, 1);
}

/// Accept up to `max_conns` connections (0 = unlimited), one task each
fn serve(w: &Wire, listener: WireListener, max_conns: u64, stats: Rc<Stats>) {
    loop {
        if max_conns != 0 && stats.accepts.get() >= max_conns {
            break;
        }
        let (stream, peer) = match listener.accept(w) {
            Ok(conn) => conn,
            Err(e) => {
                kerror!("accept: {}", e);
                bump(&stats.errors, 1);
                break;
            }
        };
        bump(&stats.accepts, 1);
        kdebug!("accepted {}", peer);

        let stats = stats.clone();
        let spawned = w.spawn_default(format!("conn-{}", peer), move |w| serve_conn(w, stream, &stats));
        if let Err(e) = spawned {
            kerror!("spawn: {}", e);
            break;
        }
    }
}

fn main() {
    wire::init_logging();

    let mut args = std::env::args().skip(1);
    let port = args.next().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT);
    let max_conns = args.next().and_then(|s| s.parse().ok()).unwrap_or(0u64);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = match WireListener::bind(addr) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("echo: bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    let rt = match Runtime::new(WireConfig::from_env()) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("echo: {}", e);
            std::process::exit(1);
        }
    };

    println!("=== Wire Echo Server ===");
    println!("  Listening:   {}", addr);
    println!("  Max conns:   {}", if max_conns == 0 { "unlimited".to_string() } else { max_conns.to_string() });

    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    if let Err(e) = rt.spawn_default("acceptor", move |w| serve(w, listener, max_conns, s)) {
        eprintln!("echo: {}", e);
        std::process::exit(1);
    }

    match rt.run() {
        Ok(run) => kinfo!("{}", run),
        Err(e) => {
            eprintln!("echo: {}", e);
            std::process::exit(1);
        }
    }

    println!("  Accepts:     {}", stats.accepts.get());
    println!("  Closes:      {}", stats.closes.get());
    println!("  Bytes:       {}", stats.bytes.get());
    println!("  Errors:      {}", stats.errors.get());
}
