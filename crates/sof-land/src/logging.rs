//! Tracing setup for hosts that do not install their own subscriber.

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Does nothing when the embedding host already installed a subscriber.
pub fn init_tracing() {
    if tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .try_init()
        .is_err()
    {
        // Tracing was already initialized by embedding host.
    }
}
