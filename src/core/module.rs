//! The compute module: one-shot backend resolution plus the arithmetic surface.
//!
//! A module starts unresolved. The first `load()` fetches and instantiates the
//! binary; whatever it produces (the binary, or the native fallback on any
//! failure) is committed for the module's lifetime. Concurrent loads wait on
//! the same attempt, so the artifact is fetched at most once.
//!
//! Arithmetic never waits for a load: until the state is committed each call
//! is answered by the native fallback.

use std::sync::OnceLock;

use tokio::sync::OnceCell;

use crate::backend::{ComputeBackend, NativeBackend, Origin};
use crate::config::{BackendMode, ComputeConfig};
use crate::error::BackendUnavailable;
use crate::source::{ArtifactLocation, ArtifactSource};

/// What a call to [`ComputeModule::resolve`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// This call ran the load attempt and committed `origin`.
    Committed(Origin),
    /// The state was already committed (by this or another caller).
    Cached(Origin),
}

impl LoadOutcome {
    pub fn origin(&self) -> Origin {
        match *self {
            LoadOutcome::Committed(o) | LoadOutcome::Cached(o) => o,
        }
    }
}

pub struct ComputeModule<S = ArtifactLocation> {
    source: S,
    mode: BackendMode,
    state: OnceCell<Box<dyn ComputeBackend>>,
}

impl ComputeModule<ArtifactLocation> {
    pub fn from_config(cfg: &ComputeConfig) -> Self {
        Self::new(cfg.artifact_location()).with_mode(cfg.backend)
    }
}

impl<S: ArtifactSource> ComputeModule<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            mode: BackendMode::Auto,
            state: OnceCell::new(),
        }
    }

    pub fn with_mode(mut self, mode: BackendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve the backend if nobody has yet, and report what happened.
    pub async fn resolve(&self) -> LoadOutcome {
        let mut committed = None;
        let slot = &mut committed;
        let backend = self
            .state
            .get_or_init(move || async move {
                let backend = self.bring_up().await;
                *slot = Some(backend.origin());
                backend
            })
            .await;

        match committed {
            Some(origin) => LoadOutcome::Committed(origin),
            None => LoadOutcome::Cached(backend.origin()),
        }
    }

    /// Load the binary backend.
    ///
    /// Returns `false` only from the call that commits the fallback; every
    /// other call (including later ones after a fallback) returns `true`.
    pub async fn load(&self) -> bool {
        !matches!(
            self.resolve().await,
            LoadOutcome::Committed(Origin::Fallback)
        )
    }

    /// [`load`](Self::load) for callers without an async runtime.
    ///
    /// Blocks the current thread until the attempt finishes.
    pub fn load_blocking(&self) -> bool {
        pollster::block_on(self.load())
    }

    async fn bring_up(&self) -> Box<dyn ComputeBackend> {
        match self.try_binary().await {
            Ok(backend) => {
                tracing::info!("Compute binary loaded from {}", self.source.describe());
                backend
            }
            Err(e) => {
                tracing::warn!("Compute binary unavailable, using native fallback: {}", e);
                Box::new(NativeBackend)
            }
        }
    }

    async fn try_binary(&self) -> Result<Box<dyn ComputeBackend>, BackendUnavailable> {
        if self.mode == BackendMode::Fallback {
            return Err(BackendUnavailable::Disabled("backend mode is `fallback`"));
        }

        #[cfg(feature = "wasm")]
        {
            tracing::debug!("Fetching compute binary from {}", self.source.describe());
            let bytes = self.source.fetch().await?;
            // Compilation is CPU-bound; keep it off the runtime workers too.
            let backend =
                crate::source::offload(move || crate::wasm::WasmBackend::from_bytes(&bytes))
                    .await?;
            Ok(Box::new(backend))
        }

        #[cfg(not(feature = "wasm"))]
        {
            Err(BackendUnavailable::Disabled("built without the `wasm` feature"))
        }
    }

    /// The committed backend, or the fallback while unresolved.
    fn backend(&self) -> &dyn ComputeBackend {
        match self.state.get() {
            Some(b) => b.as_ref(),
            None => &NativeBackend,
        }
    }

    pub fn add(&self, a: i32, b: i32) -> i32 {
        self.backend().add(a, b)
    }

    pub fn multiply(&self, a: i32, b: i32) -> i32 {
        self.backend().multiply(a, b)
    }

    pub fn sum(&self, n: i32) -> i32 {
        self.backend().sum(n)
    }

    /// Committed origin; `None` while unresolved.
    pub fn origin(&self) -> Option<Origin> {
        self.state.get().map(|b| b.origin())
    }

    pub fn is_loaded(&self) -> bool {
        self.state.initialized()
    }

    /// True only once the binary backend has been committed.
    pub fn is_binary_backend_active(&self) -> bool {
        self.origin() == Some(Origin::Wasm)
    }
}

impl<S: ArtifactSource> std::fmt::Debug for ComputeModule<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeModule")
            .field("source", &self.source.describe())
            .field("mode", &self.mode)
            .field("origin", &self.origin())
            .finish()
    }
}

// =========================================================================
// Process-wide default module
// =========================================================================

static DEFAULT_MODULE: OnceLock<ComputeModule> = OnceLock::new();

/// The process-wide module, created from the environment on first use.
pub fn default_module() -> &'static ComputeModule {
    DEFAULT_MODULE.get_or_init(|| ComputeModule::from_config(&ComputeConfig::from_env()))
}

/// Install `module` as the process-wide module.
///
/// Fails (returning the module) if the default was already created.
pub fn install_default(module: ComputeModule) -> Result<(), ComputeModule> {
    DEFAULT_MODULE.set(module)
}

pub async fn load() -> bool {
    default_module().load().await
}

pub fn add(a: i32, b: i32) -> i32 {
    default_module().add(a, b)
}

pub fn multiply(a: i32, b: i32) -> i32 {
    default_module().multiply(a, b)
}

pub fn sum(n: i32) -> i32 {
    default_module().sum(n)
}

pub fn is_binary_backend_active() -> bool {
    default_module().is_binary_backend_active()
}

#[cfg(all(test, feature = "wasm"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Source that counts fetches and optionally stalls before answering.
    struct CountingSource {
        calls: AtomicUsize,
        body: Result<Vec<u8>, u16>,
        delay: Duration,
    }

    impl CountingSource {
        fn ok(bytes: &[u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                body: Ok(bytes.to_vec()),
                delay: Duration::ZERO,
            }
        }

        fn status(status: u16) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                body: Err(status),
                delay: Duration::ZERO,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ArtifactSource for CountingSource {
        async fn fetch(&self) -> Result<Vec<u8>, BackendUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.body {
                Ok(bytes) => Ok(bytes.clone()),
                Err(status) => Err(BackendUnavailable::BadStatus {
                    url: "counting://compute.wasm".to_string(),
                    status: *status,
                }),
            }
        }

        fn describe(&self) -> String {
            "counting://compute.wasm".to_string()
        }
    }

    fn bundled() -> Vec<u8> {
        wat::parse_str(crate::COMPUTE_WAT).unwrap()
    }

    fn assert_arithmetic<S: ArtifactSource>(m: &ComputeModule<S>) {
        assert_eq!(m.add(10, 20), 30);
        assert_eq!(m.multiply(10, 20), 200);
        assert_eq!(m.sum(100), 4950);
        assert_eq!(m.add(i32::MAX, 1), i32::MIN);
        assert_eq!(m.sum(-3), 0);
    }

    #[test]
    fn arithmetic_before_load_uses_fallback() {
        let m = ComputeModule::new(CountingSource::ok(&bundled()));
        assert!(!m.is_loaded());
        assert!(!m.is_binary_backend_active());
        assert_eq!(m.origin(), None);
        assert_arithmetic(&m);
        assert_eq!(m.source().calls(), 0);
    }

    #[tokio::test]
    async fn valid_binary_is_committed() {
        let m = ComputeModule::new(CountingSource::ok(&bundled()));
        assert!(m.load().await);
        assert!(m.is_binary_backend_active());
        assert_eq!(m.origin(), Some(Origin::Wasm));
        assert_arithmetic(&m);
    }

    #[tokio::test]
    async fn not_found_commits_fallback() {
        let m = ComputeModule::new(CountingSource::status(404));
        assert!(!m.load().await);
        assert!(!m.is_binary_backend_active());
        assert_eq!(m.origin(), Some(Origin::Fallback));
        assert_arithmetic(&m);

        // Already resolved: reports loaded and does not fetch again.
        assert!(m.load().await);
        assert!(!m.is_binary_backend_active());
        assert_eq!(m.source().calls(), 1);
    }

    #[tokio::test]
    async fn sequential_loads_fetch_once() {
        let m = ComputeModule::new(CountingSource::ok(&bundled()));
        assert_eq!(m.resolve().await, LoadOutcome::Committed(Origin::Wasm));
        assert_eq!(m.resolve().await, LoadOutcome::Cached(Origin::Wasm));
        assert!(m.load().await);
        assert_eq!(m.source().calls(), 1);
    }

    #[tokio::test]
    async fn overlapping_loads_share_one_attempt() {
        let m = ComputeModule::new(
            CountingSource::ok(&bundled()).slow(Duration::from_millis(20)),
        );
        let (a, b, c) = tokio::join!(m.resolve(), m.resolve(), m.resolve());
        let committed = [a, b, c]
            .iter()
            .filter(|o| matches!(o, LoadOutcome::Committed(_)))
            .count();
        assert_eq!(committed, 1);
        assert!([a, b, c].iter().all(|o| o.origin() == Origin::Wasm));
        assert_eq!(m.source().calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_loads_fetch_once() {
        let m = Arc::new(ComputeModule::new(
            CountingSource::status(500).slow(Duration::from_millis(10)),
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                tokio::spawn(async move { m.load().await })
            })
            .collect();

        let mut falses = 0;
        for h in handles {
            if !h.await.unwrap() {
                falses += 1;
            }
        }
        assert_eq!(falses, 1);
        assert_eq!(m.source().calls(), 1);
        assert_eq!(m.origin(), Some(Origin::Fallback));
    }

    #[tokio::test]
    async fn arithmetic_during_load_does_not_block() {
        let m = ComputeModule::new(
            CountingSource::ok(&bundled()).slow(Duration::from_millis(50)),
        );
        let load = m.load();
        tokio::pin!(load);
        // Poll the load once so it is in flight, then compute.
        assert!(tokio::time::timeout(Duration::from_millis(1), &mut load)
            .await
            .is_err());
        assert_eq!(m.add(2, 2), 4);
        assert!(!m.is_binary_backend_active());
        assert!(load.await);
        assert!(m.is_binary_backend_active());
    }

    #[tokio::test]
    async fn bad_exports_commit_fallback() {
        let wat = r#"(module (func (export "add") (param i32 i32) (result i32) i32.const 0))"#;
        let m = ComputeModule::new(CountingSource::ok(&wat::parse_str(wat).unwrap()));
        assert!(!m.load().await);
        assert_eq!(m.origin(), Some(Origin::Fallback));
        assert_arithmetic(&m);
    }

    #[tokio::test]
    async fn fallback_mode_never_fetches() {
        let m = ComputeModule::new(CountingSource::ok(&bundled())).with_mode(BackendMode::Fallback);
        assert!(!m.load().await);
        assert!(!m.is_binary_backend_active());
        assert_eq!(m.source().calls(), 0);
    }

    #[test]
    fn blocking_load_without_runtime() {
        let m = ComputeModule::new(CountingSource::ok(&bundled()));
        assert!(m.load_blocking());
        assert!(m.load_blocking());
        assert_eq!(m.source().calls(), 1);
    }

    #[cfg(feature = "http")]
    #[test]
    fn http_404_end_to_end() {
        let base = crate::source::tests::serve_once("404 Not Found", Vec::new());
        let cfg = ComputeConfig {
            public_url: Some(base),
            ..Default::default()
        };
        let m = ComputeModule::from_config(&cfg);
        assert!(!m.load_blocking());
        assert!(!m.is_binary_backend_active());
        assert_arithmetic(&m);
    }

    #[cfg(feature = "http")]
    #[test]
    fn http_200_end_to_end() {
        let base = crate::source::tests::serve_once("200 OK", bundled());
        let cfg = ComputeConfig {
            public_url: Some(base),
            ..Default::default()
        };
        let m = ComputeModule::from_config(&cfg);
        assert!(m.load_blocking());
        assert!(m.is_binary_backend_active());
        assert_arithmetic(&m);
    }

    #[cfg(feature = "http")]
    #[test]
    fn wat_text_served_as_binary_commits_fallback() {
        let base =
            crate::source::tests::serve_once("200 OK", crate::COMPUTE_WAT.as_bytes().to_vec());
        let cfg = ComputeConfig {
            public_url: Some(base),
            ..Default::default()
        };
        let m = ComputeModule::from_config(&cfg);
        assert!(!m.load_blocking());
        assert_eq!(m.origin(), Some(Origin::Fallback));
        assert_arithmetic(&m);
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn slow_fetch_respects_caller_timeout() {
        let base = crate::source::tests::serve_once_after(
            Duration::from_millis(800),
            "404 Not Found",
            Vec::new(),
        );
        let cfg = ComputeConfig {
            public_url: Some(base),
            ..Default::default()
        };
        let m = ComputeModule::from_config(&cfg);

        let started = std::time::Instant::now();
        let timed = tokio::time::timeout(Duration::from_millis(50), m.load()).await;
        assert!(timed.is_err());
        assert!(started.elapsed() < Duration::from_millis(500));

        // Still unresolved; arithmetic keeps answering natively.
        assert!(!m.is_loaded());
        assert_arithmetic(&m);
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn slow_fetch_lets_other_tasks_run() {
        let base = crate::source::tests::serve_once_after(
            Duration::from_millis(300),
            "404 Not Found",
            Vec::new(),
        );
        let cfg = ComputeConfig {
            public_url: Some(base),
            ..Default::default()
        };
        let m = ComputeModule::from_config(&cfg);

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        assert!(!m.load().await);
        ticker.abort();
        assert!(ticks.load(Ordering::SeqCst) >= 5);
        assert_eq!(m.origin(), Some(Origin::Fallback));
    }

    #[test]
    fn default_module_answers_without_load() {
        assert_eq!(add(10, 20), 30);
        assert_eq!(multiply(10, 20), 200);
        assert_eq!(sum(100), 4950);
    }
}
