//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber on stderr.
///
/// Uses `RUST_LOG` for filtering (defaults to "info" if not set). Stdout is
/// left for the capability report.
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
