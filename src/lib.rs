//! Channel metadata scraper: resolves a channel, lists its latest videos and
//! collects per-video metadata while streaming progress to the caller.

pub mod config;
pub mod details;
pub mod engagement;
pub mod enumerator;
pub mod error;
pub mod http;
pub mod innertube;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod search;
pub mod server;
pub mod transcript;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "tubescan=info";

/// Installs the global tracing subscriber. Logs go to stderr so stdout stays
/// free for machine-readable output.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
