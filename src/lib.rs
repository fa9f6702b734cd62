//! # wasmcompute
//!
//! Integer arithmetic served by a WebAssembly binary when one can be loaded,
//! and by an equivalent native implementation otherwise.
//!
//! ## Quick Start
//!
//! ```
//! use wasmcompute::prelude::*;
//!
//! let module = ComputeModule::from_config(&ComputeConfig::default());
//!
//! // Usable before (or without) loading: answered natively.
//! assert_eq!(module.add(10, 20), 30);
//! assert!(!module.is_binary_backend_active());
//!
//! // Resolve once; a missing binary commits the fallback.
//! let _binary = module.load_blocking();
//! assert_eq!(module.sum(100), 4950);
//! ```
//!
//! ## Feature Flags
//!
//! - `wasm` (default): instantiate the binary with wasmtime
//! - `http` (default): fetch the binary over HTTP(S) with ureq
//! - `serde` (default): serializable config and origin types
//! - `wat`: compile the bundled WAT source (`compute-cli build-wasm`)
//!
//! ## Modules
//!
//! - [`module`]: one-shot backend resolution and the arithmetic surface
//! - [`backend`]: the backend trait and native fallback
//! - [`wasm`]: wasmtime-backed backend
//! - [`source`]: artifact locations (URL or file)
//! - [`config`]: environment and file configuration

#[path = "core/backend.rs"]
pub mod backend;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/module.rs"]
pub mod module;

#[path = "core/source.rs"]
pub mod source;

#[cfg(feature = "wasm")]
#[path = "core/wasm.rs"]
pub mod wasm;

/// WAT source of the reference compute binary.
pub const COMPUTE_WAT: &str = include_str!("../assets/compute.wat");

/// Compile [`COMPUTE_WAT`] to WebAssembly bytes.
#[cfg(feature = "wat")]
pub fn build_compute_wasm() -> Result<Vec<u8>, wat::Error> {
    wat::parse_str(COMPUTE_WAT)
}

/// Prelude module for convenient imports.
///
/// ```
/// use wasmcompute::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{ComputeBackend, NativeBackend, Origin};
    pub use crate::config::{BackendMode, ComputeConfig};
    pub use crate::error::BackendUnavailable;
    pub use crate::module::{ComputeModule, LoadOutcome};
    pub use crate::source::{ArtifactLocation, ArtifactSource};
}
