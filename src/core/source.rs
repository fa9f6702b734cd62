//! Where the compute binary comes from.

use std::future::Future;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::BackendUnavailable;

/// Artifact path appended to the configured base.
pub const ARTIFACT_PATH: &str = "wasm/compute.wasm";

/// Upper bound on artifact size; anything larger is treated as unavailable.
pub const MAX_ARTIFACT_BYTES: u64 = 16 * 1024 * 1024;

/// Something that can produce the bytes of a compute binary.
///
/// `fetch` is the only suspension point of a load besides instantiation.
pub trait ArtifactSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<u8>, BackendUnavailable>> + Send;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// A concrete artifact location: an HTTP(S) URL or a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "at", rename_all = "lowercase"))]
pub enum ArtifactLocation {
    Http(String),
    File(PathBuf),
}

impl ArtifactLocation {
    /// `http://` and `https://` strings are URLs; anything else is a path.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            ArtifactLocation::Http(s.to_string())
        } else {
            ArtifactLocation::File(PathBuf::from(s))
        }
    }

    /// `<base>/wasm/compute.wasm`, or `wasm/compute.wasm` under the working
    /// directory when no base is configured.
    pub fn from_base(base: Option<&str>) -> Self {
        match base.map(str::trim).filter(|b| !b.is_empty()) {
            Some(b) => {
                let b = b.trim_end_matches('/');
                match Self::parse(b) {
                    ArtifactLocation::Http(url) => {
                        ArtifactLocation::Http(format!("{}/{}", url, ARTIFACT_PATH))
                    }
                    ArtifactLocation::File(dir) => ArtifactLocation::File(dir.join(ARTIFACT_PATH)),
                }
            }
            None => ArtifactLocation::File(PathBuf::from(ARTIFACT_PATH)),
        }
    }
}

impl Default for ArtifactLocation {
    fn default() -> Self {
        Self::from_base(None)
    }
}

impl ArtifactSource for ArtifactLocation {
    async fn fetch(&self) -> Result<Vec<u8>, BackendUnavailable> {
        match self.clone() {
            ArtifactLocation::Http(url) => offload(move || fetch_http(&url)).await,
            ArtifactLocation::File(path) => offload(move || read_file(&path)).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            ArtifactLocation::Http(url) => url.clone(),
            ArtifactLocation::File(path) => path.display().to_string(),
        }
    }
}

/// Run blocking work on the tokio blocking pool when called inside a runtime,
/// so the caller's task yields until it finishes. Without a runtime (e.g.
/// under `pollster`) the work runs inline.
pub(crate) async fn offload<T, F>(f: F) -> Result<T, BackendUnavailable>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BackendUnavailable> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle
            .spawn_blocking(f)
            .await
            .map_err(|e| BackendUnavailable::Io(std::io::Error::other(e.to_string())))?,
        Err(_) => f(),
    }
}

/// GET `url`. Blocks the calling thread for the duration of the request.
#[cfg(feature = "http")]
fn fetch_http(url: &str) -> Result<Vec<u8>, BackendUnavailable> {
    use std::io::Read as _;

    let response = match ureq::get(url).call() {
        Ok(r) => r,
        Err(ureq::Error::Status(status, _)) => {
            return Err(BackendUnavailable::BadStatus {
                url: url.to_string(),
                status,
            })
        }
        Err(e) => {
            return Err(BackendUnavailable::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })
        }
    };

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_ARTIFACT_BYTES + 1)
        .read_to_end(&mut body)?;
    if body.len() as u64 > MAX_ARTIFACT_BYTES {
        return Err(BackendUnavailable::Fetch {
            url: url.to_string(),
            message: format!("artifact exceeds {} bytes", MAX_ARTIFACT_BYTES),
        });
    }
    Ok(body)
}

#[cfg(not(feature = "http"))]
fn fetch_http(_url: &str) -> Result<Vec<u8>, BackendUnavailable> {
    Err(BackendUnavailable::Disabled("built without the `http` feature"))
}

fn read_file(path: &Path) -> Result<Vec<u8>, BackendUnavailable> {
    let len = std::fs::metadata(path)?.len();
    if len > MAX_ARTIFACT_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is {} bytes, limit is {}", path.display(), len, MAX_ARTIFACT_BYTES),
        )
        .into());
    }
    Ok(std::fs::read(path)?)
}
