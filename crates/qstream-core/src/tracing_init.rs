//! Shared tracing/logging initialization.
//!
//! Logs go to stderr so stdout stays free for turn results.

use std::io;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- filter used when `RUST_LOG` is unset or invalid
///   (e.g. `"qstream=info"`).
/// * `log_json` -- emit one JSON object per event, with the session span's
///   fields (`session_id`, identity) attached.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (json, plain) = if log_json {
        (Some(fmt::layer().json().with_writer(io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(io::stderr)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(plain)
        .init();
}
