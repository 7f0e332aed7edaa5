//! Build script for wire-runtime
//!
//! Generates `OUT_DIR/wire_defaults.rs`, the compile-time defaults behind
//! `WireConfig`:
//! 1. Start with library defaults
//! 2. With the `custom-config` feature and `WIRE_CONFIG_RS` set, parse the
//!    user's file of `pub const NAME: TYPE = VALUE;` lines
//! 3. User values win; unknown names are reported as warnings
//!
//! Environment variables still override these at runtime (`WIRE_*`).

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "STACK_SIZE",
        rust_type: "usize",
        default_value: "64 * 1024",
    },
    ConfigParam {
        name: "MAX_EVENTS",
        rust_type: "usize",
        default_value: "256",
    },
    ConfigParam {
        name: "READY_QUEUE_CAPACITY",
        rust_type: "usize",
        default_value: "1024",
    },
    ConfigParam {
        // Dispatches between non-blocking polls while tasks are blocked
        name: "POLL_INTERVAL",
        rust_type: "u32",
        default_value: "61",
    },
    ConfigParam {
        // 0 = wait for events forever
        name: "IDLE_TIMEOUT_MS",
        rust_type: "u64",
        default_value: "0",
    },
    ConfigParam {
        name: "DEBUG_LOGGING",
        rust_type: "bool",
        default_value: "false",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("wire_defaults.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let custom = env::var("CARGO_FEATURE_CUSTOM_CONFIG").is_ok();
    let mut source = None;

    if custom {
        if let Ok(user_path) = env::var("WIRE_CONFIG_RS") {
            println!("cargo:rerun-if-changed={}", user_path);

            match fs::read_to_string(&user_path) {
                Ok(content) => {
                    for unknown in parse_and_merge(&content, &mut config) {
                        println!("cargo:warning=Unknown config parameter: {}", unknown);
                    }
                    println!("cargo:warning=Using custom config: {}", user_path);
                    source = Some(user_path);
                }
                Err(e) => {
                    println!(
                        "cargo:warning=Failed to read WIRE_CONFIG_RS ({}): {}",
                        user_path, e
                    );
                }
            }
        }
    }

    println!("cargo:rerun-if-env-changed=WIRE_CONFIG_RS");

    let output = generate_config(&config, source.as_deref());
    fs::write(&dest_path, output).expect("Failed to write wire_defaults.rs");
}

/// Merge known `pub const` lines into `config`, returning unknown names
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) -> Vec<String> {
    let mut unknown = Vec::new();

    for line in content.lines().map(str::trim) {
        if !line.starts_with("pub const ") {
            continue;
        }

        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };

        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => unknown.push(name),
        }
    }

    unknown
}

/// `pub const NAME: TYPE = VALUE;` -> (NAME, VALUE)
fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();

    let colon_pos = rest.find(':')?;
    let name = rest[..colon_pos].trim().to_string();

    let eq_pos = rest.find('=')?;
    let semi_pos = rest.rfind(';').unwrap_or(rest.len());
    if semi_pos <= eq_pos {
        return None;
    }

    let value = rest[eq_pos + 1..semi_pos].trim().to_string();

    Some((name, value))
}

fn generate_config(config: &HashMap<&str, String>, source: Option<&str>) -> String {
    let mut output = String::new();

    output.push_str("// Auto-generated by build.rs - do not edit\n");
    match source {
        Some(path) => output.push_str(&format!("// Library defaults merged with {}\n\n", path)),
        None => output.push_str("// Library defaults\n\n"),
    }

    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }

    output
}
