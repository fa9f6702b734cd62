//! Loader configuration.
//!
//! Values come from an optional JSON file and are then overridden by
//! environment variables:
//!
//! - `WASMCOMPUTE_PUBLIC_URL`: base URL or directory; the artifact is
//!   `<base>/wasm/compute.wasm`
//! - `WASMCOMPUTE_ARTIFACT`: full artifact URL or path (wins over the base)
//! - `WASMCOMPUTE_BACKEND`: `auto` | `fallback`

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::source::ArtifactLocation;

pub const ENV_PUBLIC_URL: &str = "WASMCOMPUTE_PUBLIC_URL";
pub const ENV_ARTIFACT: &str = "WASMCOMPUTE_ARTIFACT";
pub const ENV_BACKEND: &str = "WASMCOMPUTE_BACKEND";

/// Backend selection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendMode {
    /// Try the binary, fall back on any failure.
    #[default]
    Auto,
    /// Never fetch; always use the native fallback.
    Fallback,
}

impl BackendMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "wasm" => Some(BackendMode::Auto),
            "fallback" | "native" => Some(BackendMode::Fallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ComputeConfig {
    pub public_url: Option<String>,
    pub artifact: Option<String>,
    pub backend: BackendMode,
}

impl ComputeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg
    }

    /// Parse a JSON config file body.
    #[cfg(feature = "serde")]
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Override fields from `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_PUBLIC_URL) {
            self.public_url = Some(v);
        }
        if let Some(v) = lookup(ENV_ARTIFACT) {
            self.artifact = Some(v);
        }
        if let Some(v) = lookup(ENV_BACKEND) {
            match BackendMode::parse(&v) {
                Some(mode) => self.backend = mode,
                None => tracing::warn!("Unknown {} value: {}", ENV_BACKEND, v),
            }
        }
    }

    /// Resolved artifact location.
    pub fn artifact_location(&self) -> ArtifactLocation {
        match self.artifact.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(a) => ArtifactLocation::parse(a),
            None => ArtifactLocation::from_base(self.public_url.as_deref()),
        }
    }
}
