//! Load failures for the compute binary.
//!
//! Every variant means the same thing to callers: the binary backend is not
//! available and the native fallback is used instead. The variants only exist
//! so the cause can be logged.

use std::io;

/// Why the binary compute backend could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum BackendUnavailable {
    /// The request never produced a response (DNS, connect, TLS, ...).
    #[error("fetch of {url} failed: {message}")]
    Fetch { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("fetch of {url} returned HTTP {status}")]
    BadStatus { url: String, status: u16 },

    /// Reading the artifact (file or response body) failed.
    #[error("reading compute artifact failed: {0}")]
    Io(#[from] io::Error),

    /// The bytes are not a valid module, or instantiation failed.
    #[error("compute binary rejected: {0}")]
    Compile(String),

    /// A required export is missing or has the wrong signature.
    #[error("compute binary export `{name}` unusable: {reason}")]
    Export { name: &'static str, reason: String },

    /// Binary loading is switched off (config or missing cargo feature).
    #[error("binary backend disabled ({0})")]
    Disabled(&'static str),
}
