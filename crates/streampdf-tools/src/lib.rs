//! Command-line tools for the streampdf reduction

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging with a default filter.
///
/// Use the `RUST_LOG` environment variable to override the default filter.
/// Default is `info` across the streampdf crates.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,streampdf_pipeline=info,streampdf_io=info,streampdf_core=info")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
