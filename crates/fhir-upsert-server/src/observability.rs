// Tracing initialization with the configured log level.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber. `RUST_LOG` keeps precedence over `level`.
pub fn init_tracing_with_level(level: &str) {
    let filter = env_filter(std::env::var("RUST_LOG").ok().as_deref(), level);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

fn env_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}
