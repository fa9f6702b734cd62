//! Compute Daemon - serves the compute module to local clients
//!
//! On start the daemon:
//! - reads `config.json` from the app data dir (env vars override it)
//! - installs the process-wide compute module
//! - loads the compute binary in the background (arithmetic is answered by
//!   the native fallback until that finishes)
//! - accepts JSON-lines requests on 127.0.0.1:9877
//!
//! Storage locations:
//! - Linux: ~/.local/share/wasmcompute/
//! - Windows: %APPDATA%\wasmcompute\
//! - MacOS: ~/Library/Application Support/wasmcompute/

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use wasmcompute::prelude::*;

mod paths;

use paths::AppPaths;

const DEFAULT_ADDR: &str = "127.0.0.1:9877";
const ENV_ADDR: &str = "WASMCOMPUTE_ADDR";

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

fn handle_request<S: ArtifactSource>(module: &ComputeModule<S>, request: Request) -> Response {
    // Unresolved modules answer natively.
    let origin = module.origin().unwrap_or(Origin::Fallback);
    match request {
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

async fn handle_client<S: ArtifactSource>(
    stream: TcpStream,
    module: &ComputeModule<S>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle_request(module, request),
            Err(e) => Response::Error {
                message: format!("Invalid request: {}", e),
            },
        };
        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

/// File config (if present) overridden by the environment.
fn load_config(paths: &AppPaths) -> ComputeConfig {
    let path = paths.config_file();
    let mut cfg = match std::fs::read_to_string(&path) {
        Ok(text) => match ComputeConfig::from_json(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                ComputeConfig::default()
            }
        },
        Err(_) => ComputeConfig::default(),
    };
    cfg.apply_env(|k| std::env::var(k).ok());
    cfg
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cfg = match AppPaths::new() {
        Ok(paths) => {
            info!("Config directory: {:?}", paths.data_dir());
            load_config(&paths)
        }
        Err(e) => {
            warn!("{}; using environment only", e);
            ComputeConfig::from_env()
        }
    };

    if wasmcompute::module::install_default(ComputeModule::from_config(&cfg)).is_err() {
        warn!("Compute module already initialized; config file ignored");
    }
    let module = wasmcompute::module::default_module();
    info!("Compute artifact: {}", module.source().describe());

    // Arithmetic is answered natively until this resolves.
    tokio::spawn(async move {
        if module.load().await {
            info!(
                "Compute backend ready (origin {})",
                module.origin().unwrap_or(Origin::Fallback)
            );
        } else {
            info!("Compute backend ready (native fallback)");
        }
    });

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C: shutting down");
            std::process::exit(0);
        }
    });

    let addr = std::env::var(ENV_ADDR).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Compute daemon listening on {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Client connected: {}", peer);

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, module).await {
                error!("Client handler error: {}", e);
            }
        });
    }
}
