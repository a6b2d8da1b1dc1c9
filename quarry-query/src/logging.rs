//! Logging setup for Quarry.
//!
//! Quarry logs through `tracing`. Builders emit a `debug!` event per command
//! with the collection and compiled filter, and a `warn!` when the server
//! rejects a command whose result then degrades to `0`/`None`/`false`.
//!
//! # Environment Variables
//!
//! - `QUARRY_DEBUG=true|1|yes` - Enable debug logging
//! - `QUARRY_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use quarry_query::logging;
//!
//! // Call once at startup; installs a subscriber when the
//! // `tracing-subscriber` feature is enabled.
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Whether `QUARRY_DEBUG` enables debug logging.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("QUARRY_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The level from `QUARRY_LOG_LEVEL`.
///
/// Defaults to "debug" when `QUARRY_DEBUG` is set, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("QUARRY_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The format from `QUARRY_LOG_FORMAT`, "json" by default.
pub fn get_log_format() -> &'static str {
    env::var("QUARRY_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize logging. Subsequent calls are no-ops.
///
/// Nothing is installed unless `QUARRY_DEBUG` or `QUARRY_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("QUARRY_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "quarry_orm={},quarry_query={},quarry_mongodb={},quarry_model={}",
                level, level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(
                level = level,
                format = get_log_format(),
                "Quarry logging initialized"
            );
        }
    });
}

/// Initialize logging at a specific level.
///
/// # Safety
///
/// Modifies the process environment. Call at startup before spawning
/// threads.
pub fn init_with_level(level: &str) {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var("QUARRY_LOG_LEVEL", level);
    }
    init();
}

/// Initialize debug logging, as if `QUARRY_DEBUG=true` were set.
///
/// # Safety
///
/// Modifies the process environment. Call at startup before spawning
/// threads.
pub fn init_debug() {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var("QUARRY_DEBUG", "true");
    }
    init();
}

/// Debug logging that only fires when `QUARRY_DEBUG` is enabled at runtime.
#[macro_export]
macro_rules! quarry_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            $crate::tracing::debug!($($arg)*);
        }
    };
}
