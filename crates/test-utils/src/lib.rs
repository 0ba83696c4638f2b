pub mod builders;

use std::sync::{Arc, Once};
use std::time::Duration;

use kernelgate::catalog::Catalog;
use kernelgate::kernel::{EventStream, ExecutionEvent, KernelSpec};
use kernelgate::progress::MemoryProgressStore;
use kernelgate::relay::RelayOptions;
use kernelgate::scoring::ProgramSpec;
use kernelgate::service::Backend;
use kernelgate::types::TeardownPolicy;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Drain one submission's events, up to and including the idle status.
pub async fn collect_until_idle(mut events: EventStream) -> Vec<ExecutionEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal();
        collected.push(event);
        if terminal {
            break;
        }
    }
    collected
}

/// Relay options with a short grace period, for teardown tests.
pub fn quick_relay_options(grace: Duration) -> RelayOptions {
    RelayOptions {
        grace_period: grace,
        teardown_on: TeardownPolicy::PageLeft,
    }
}

/// A backend with `sh` kernels, `sh` scoring and in-memory progress.
///
/// Returns the progress store too so tests can inspect it directly.
pub fn shell_backend(catalog: Catalog) -> (Backend, Arc<MemoryProgressStore>) {
    let progress = Arc::new(MemoryProgressStore::new());
    let backend = Backend::new(
        KernelSpec::shell(),
        catalog,
        progress.clone(),
        ProgramSpec::shell(),
        quick_relay_options(Duration::from_millis(200)),
    );
    (backend, progress)
}
