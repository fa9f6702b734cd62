//! Compute backends and the native fallback.
//!
//! A backend is anything that provides the three arithmetic operations. Both
//! backends work on `i32` with two's complement wrapping, which is what the
//! WebAssembly `i32` instructions do, so results agree bit-for-bit whichever
//! backend is active.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of backend is answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Origin {
    /// The compiled WebAssembly binary.
    Wasm,
    /// The in-process native implementation.
    Fallback,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Wasm => "wasm",
            Origin::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The capability set every backend provides.
///
/// All operations are pure and total: no input makes them fail or panic.
pub trait ComputeBackend: Send + Sync {
    /// `a + b`, wrapping.
    fn add(&self, a: i32, b: i32) -> i32;

    /// `a * b`, wrapping.
    fn multiply(&self, a: i32, b: i32) -> i32;

    /// Sum of the integers in `[0, n)`; `0` when `n <= 0`.
    fn sum(&self, n: i32) -> i32;

    /// Which kind of backend this is.
    fn origin(&self) -> Origin;
}

/// Native implementation used whenever the binary is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl ComputeBackend for NativeBackend {
    #[inline]
    fn add(&self, a: i32, b: i32) -> i32 {
        native_add(a, b)
    }

    #[inline]
    fn multiply(&self, a: i32, b: i32) -> i32 {
        native_multiply(a, b)
    }

    #[inline]
    fn sum(&self, n: i32) -> i32 {
        native_sum(n)
    }

    fn origin(&self) -> Origin {
        Origin::Fallback
    }
}

#[inline]
pub fn native_add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

#[inline]
pub fn native_multiply(a: i32, b: i32) -> i32 {
    a.wrapping_mul(b)
}

/// `n*(n-1)/2` computed in 64 bits, then truncated to 32.
///
/// The truncation equals the wrapped running sum, so this matches a binary
/// that accumulates with `i32.add`.
#[inline]
pub fn native_sum(n: i32) -> i32 {
    if n <= 0 {
        return 0;
    }
    let n = i64::from(n);
    ((n * (n - 1)) >> 1) as i32
}
