//! WebAssembly backend using wasmtime.
//!
//! The binary must export `add(i32,i32)->i32`, `multiply(i32,i32)->i32` and
//! `sum(i32)->i32`. Each export is looked up and type-checked before the
//! backend is handed out; any mismatch rejects the whole binary.
//!
//! Enable with the `wasm` feature flag.

use std::sync::Mutex;

use wasmtime::{Engine, Instance, Module, Store, TypedFunc};

use crate::backend::{native_add, native_multiply, native_sum, ComputeBackend, Origin};
use crate::error::BackendUnavailable;

struct WasmInstance {
    store: Store<()>,
    add: TypedFunc<(i32, i32), i32>,
    multiply: TypedFunc<(i32, i32), i32>,
    sum: TypedFunc<i32, i32>,
}

/// Compute backend backed by an instantiated WebAssembly module.
pub struct WasmBackend {
    // wasmtime calls need `&mut Store`.
    inner: Mutex<WasmInstance>,
}

impl WasmBackend {
    /// Compile and instantiate `bytes`, validating the three exports.
    ///
    /// Only the binary format is accepted; WAT text is rejected. The module
    /// gets no imports; one that needs any fails to instantiate.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BackendUnavailable> {
        let engine = Engine::default();
        let module = Module::from_binary(&engine, bytes)
            .map_err(|e| BackendUnavailable::Compile(e.to_string()))?;
        let mut store = Store::new(&engine, ());
        let instance = Instance::new(&mut store, &module, &[])
            .map_err(|e| BackendUnavailable::Compile(e.to_string()))?;

        let add = typed_export::<(i32, i32)>(&instance, &mut store, "add")?;
        let multiply = typed_export::<(i32, i32)>(&instance, &mut store, "multiply")?;
        let sum = typed_export::<i32>(&instance, &mut store, "sum")?;

        Ok(Self {
            inner: Mutex::new(WasmInstance {
                store,
                add,
                multiply,
                sum,
            }),
        })
    }

    fn call<P: wasmtime::WasmParams>(
        &self,
        op: &'static str,
        params: P,
        pick: impl FnOnce(&WasmInstance) -> TypedFunc<P, i32>,
        native: impl FnOnce() -> i32,
    ) -> i32 {
        let Ok(mut guard) = self.inner.lock() else {
            tracing::warn!("wasm `{}` skipped: instance lock poisoned", op);
            return native();
        };
        let func = pick(&guard);
        match func.call(&mut guard.store, params) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("wasm `{}` trapped, using native result: {}", op, e);
                native()
            }
        }
    }
}

fn typed_export<P: wasmtime::WasmParams>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &'static str,
) -> Result<TypedFunc<P, i32>, BackendUnavailable> {
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| BackendUnavailable::Export {
            name,
            reason: "missing function export".to_string(),
        })?;
    func.typed::<P, i32>(&*store)
        .map_err(|e| BackendUnavailable::Export {
            name,
            reason: e.to_string(),
        })
}

impl ComputeBackend for WasmBackend {
    fn add(&self, a: i32, b: i32) -> i32 {
        self.call("add", (a, b), |i| i.add.clone(), || native_add(a, b))
    }

    fn multiply(&self, a: i32, b: i32) -> i32 {
        self.call(
            "multiply",
            (a, b),
            |i| i.multiply.clone(),
            || native_multiply(a, b),
        )
    }

    fn sum(&self, n: i32) -> i32 {
        self.call("sum", n, |i| i.sum.clone(), || native_sum(n))
    }

    fn origin(&self) -> Origin {
        Origin::Wasm
    }
}

impl std::fmt::Debug for WasmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmBackend").finish_non_exhaustive()
    }
}
