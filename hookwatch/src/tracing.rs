//! Logging setup and the crate's logging prelude.
//!
//! Modules log through `use crate::tracing::prelude::*;` so the macros in
//! use stay consistent across the crate.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod prelude {
    #[allow(unused_imports)]
    pub use ::tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Logs go to the systemd journal when the process was started by systemd
/// (`JOURNAL_STREAM` is set), otherwise to stdout with local timestamps.
/// `RUST_LOG` overrides the default `info` filter either way.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if std::env::var_os("JOURNAL_STREAM").is_some() {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => eprintln!("journald unavailable, logging to stdout: {e}"),
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(fmt::time::LocalTime::rfc_3339()))
        .init();
}
