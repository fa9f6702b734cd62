//! CLI client for the `computed` daemon.
//!
//! Examples:
//!   compute-cli status
//!   compute-cli add 10 20
//!   compute-cli multiply 10 20
//!   compute-cli sum 100
//!   compute-cli --local sum 100
//!   compute-cli build-wasm public/wasm/compute.wasm
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`.
//! `--local` skips the daemon and loads the compute module in-process.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

use wasmcompute::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    Status,
    Add { a: i32, b: i32 },
    Multiply { a: i32, b: i32 },
    Sum { n: i32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    Status {
        loaded: bool,
        origin: Option<Origin>,
        binary_active: bool,
        #[serde(default)]
        artifact: String,
    },
    Value {
        value: i32,
        origin: Origin,
    },
    Error {
        message: String,
    },
}

fn usage() -> ! {
    eprintln!("compute-cli (talks to computed @ 127.0.0.1:9877 by default)");
    eprintln!("Usage: compute-cli [--addr host:port | --local] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  status                      Show which backend is active");
    eprintln!("  add <a> <b>                 a + b");
    eprintln!("  multiply <a> <b>            a * b");
    eprintln!("  sum <n>                     0 + 1 + ... + (n-1)");
    eprintln!("  build-wasm <out.wasm>       Compile the bundled WAT (needs `wat` feature)");
    process::exit(1);
}

enum Target {
    Daemon(String),
    Local,
}

fn parse_args() -> (Target, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut target = Target::Daemon("127.0.0.1:9877".to_string());
    if args.len() >= 2 && args[0] == "--addr" {
        target = Target::Daemon(args[1].clone());
        args.drain(0..2);
    } else if args[0] == "--local" {
        target = Target::Local;
        args.drain(0..1);
    }
    if args.is_empty() {
        usage();
    }
    (target, args)
}

fn parse_i32(name: &str, s: Option<&String>) -> Result<i32, String> {
    let s = s.ok_or_else(|| format!("missing <{}>", name))?;
    s.trim()
        .parse()
        .map_err(|_| format!("<{}> must be a 32-bit integer, got {:?}", name, s))
}

fn parse_request(args: &[String]) -> Result<Request, String> {
    match args[0].as_str() {
        "status" => Ok(Request::Status),
        "add" => Ok(Request::Add {
            a: parse_i32("a", args.get(1))?,
            b: parse_i32("b", args.get(2))?,
        }),
        "multiply" | "mul" => Ok(Request::Multiply {
            a: parse_i32("a", args.get(1))?,
            b: parse_i32("b", args.get(2))?,
        }),
        "sum" => Ok(Request::Sum {
            n: parse_i32("n", args.get(1))?,
        }),
        other => Err(format!("unknown command: {}", other)),
    }
}

fn send_request(addr: &str, req: &Request) -> Result<Response, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| format!("set_read_timeout: {e}"))?;
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

/// Answer `req` with an in-process module, loading it first.
fn run_local(req: &Request) -> Response {
    let module = wasmcompute::module::default_module();
    module.load_blocking();
    let origin = module.origin().unwrap_or(Origin::Fallback);
    match *req {
        Request::Status => Response::Status {
            loaded: module.is_loaded(),
            origin: module.origin(),
            binary_active: module.is_binary_backend_active(),
            artifact: module.source().describe(),
        },
        Request::Add { a, b } => Response::Value {
            value: module.add(a, b),
            origin,
        },
        Request::Multiply { a, b } => Response::Value {
            value: module.multiply(a, b),
            origin,
        },
        Request::Sum { n } => Response::Value {
            value: module.sum(n),
            origin,
        },
    }
}

fn print_response(resp: Response) {
    match resp {
        Response::Status {
            loaded,
            origin,
            binary_active,
            artifact,
        } => {
            let origin = origin.map(|o| o.as_str()).unwrap_or("unresolved");
            println!(
                "loaded={} origin={} binary_active={} artifact={}",
                loaded, origin, binary_active, artifact
            );
        }
        Response::Value { value, origin } => println!("{} ({})", value, origin),
        Response::Error { message } => {
            eprintln!("Error: {}", message);
            process::exit(1);
        }
    }
}

#[cfg(feature = "wat")]
fn build_wasm(out: &str) -> Result<(), String> {
    let bytes = wasmcompute::build_compute_wasm().map_err(|e| format!("compile: {e}"))?;
    let out = std::path::Path::new(out);
    if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| format!("create {}: {e}", dir.display()))?;
    }
    std::fs::write(out, &bytes).map_err(|e| format!("write {}: {e}", out.display()))?;
    println!("Built: {} ({} bytes)", out.display(), bytes.len());
    Ok(())
}

#[cfg(not(feature = "wat"))]
fn build_wasm(_out: &str) -> Result<(), String> {
    // Not fatal: without the binary every load uses the native fallback.
    println!("wat support not compiled in, skipping WASM build (native fallback will be used)");
    Ok(())
}

fn main() {
    let (target, args) = parse_args();

    if args[0] == "build-wasm" {
        let Some(out) = args.get(1) else { usage() };
        if let Err(e) = build_wasm(out) {
            eprintln!("WASM build failed: {}", e);
            process::exit(1);
        }
        return;
    }

    let req = parse_request(&args).unwrap_or_else(|e| {
        eprintln!("{}", e);
        usage();
    });

    let resp = match target {
        Target::Local => run_local(&req),
        Target::Daemon(addr) => send_request(&addr, &req).unwrap_or_else(|e| {
            eprintln!("{}", e);
            process::exit(1);
        }),
    };
    print_response(resp);
}
