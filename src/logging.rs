//! Logging Setup
//!
//! The library only emits `tracing` events: `debug!` per pipeline stage with
//! input and output shapes, `info!` when weights are loaded or saved. Binaries
//! call [`init_tracing`] once to print them.
//!
//! The filter comes from `RUST_LOG` (e.g. `RUST_LOG=petal=debug` to trace every
//! stage) and defaults to `info`.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Install the global fmt subscriber; later calls are no-ops
pub fn init_tracing() {
    INITIALISED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr);
        // Another subscriber may already be installed (e.g. by a test harness)
        let _ = Registry::default().with(filter).with(fmt_layer).try_init();
    });
}
