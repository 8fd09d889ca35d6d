//! Debug log and error reporting.
//!
//! Everything goes through `tracing`. [`init`] installs the fmt subscriber for
//! the binary; library users may install their own subscriber instead.

use std::error::Error as StdError;
use std::sync::Once;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "SWEEPME_LOG";

/// Environment variable that switches on debug mode when set to `True`.
pub const DEBUG_MODE_ENV: &str = "SWEEPME_DEBUGMODE";

static INIT: Once = Once::new();

/// Initialize the sweepme tracing subscriber.
///
/// Reads [`LOG_ENV`] for the filter. Falls back to `sweepme=debug` in debug
/// mode and `sweepme=info` otherwise. Calling it more than once is a no-op.
pub fn init(debug: bool) {
    INIT.call_once(|| {
        let default = if debug || is_debug_mode() {
            "sweepme=debug"
        } else {
            "sweepme=info"
        };
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

        // try_init: a host application may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).compact())
            .with(filter)
            .try_init();
    });
}

/// Whether debug mode is switched on through [`DEBUG_MODE_ENV`].
pub fn is_debug_mode() -> bool {
    std::env::var(DEBUG_MODE_ENV)
        .map(|value| value == "True")
        .unwrap_or(false)
}

/// Local time in the day.month.year hh:mm:ss layout of the debug log.
pub fn timestamp() -> String {
    Local::now().format("%-d.%-m.%Y %H:%M:%S").to_string()
}

/// Report an error together with its chain of sources.
pub fn error(message: &str, err: &dyn StdError) {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }

    tracing::error!(time = %timestamp(), "{}: {}", message, chain);
}

/// Write a message to the debug log.
///
/// With `debug_mode_only` the message is emitted only when debug mode is on.
pub fn debug(message: &str, debug_mode_only: bool) {
    if message.is_empty() {
        return;
    }
    if !debug_mode_only {
        tracing::info!(time = %timestamp(), "{}", message);
    } else if is_debug_mode() {
        tracing::debug!(time = %timestamp(), "{}", message);
    }
}

/// Write a message to the debug log only in debug mode.
pub fn debug_only(message: &str) {
    debug(message, true);
}
