use tracing_subscriber::{EnvFilter, fmt};

use crate::config::SessionConfig;

/// Install the fmt subscriber. RUST_LOG wins over the configured filter.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(cfg: &SessionConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
