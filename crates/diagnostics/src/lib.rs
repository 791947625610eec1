// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging for the catalog sync workspace.
//!
//! Every crate logs through the macros exported here, which forward to
//! `emit` and render on stderr with `emit_term`.
//!
//! Verbosity comes from the `CATSYNC_LOG` environment variable:
//! - `off` (default) - no logs
//! - `error`, `warn`, `info` - increasingly chatty operational logs
//! - `debug` - per-file and per-chunk detail

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "CATSYNC_LOG";

static INIT: Once = Once::new();

/// Map a level name onto an emit filter level.
///
/// `Ok(None)` means logging is switched off; `Err` carries the
/// unrecognized name back to the caller.
pub fn parse_level(name: &str) -> Result<Option<emit::Level>, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "off" => Ok(None),
        "debug" => Ok(Some(emit::Level::Debug)),
        "info" => Ok(Some(emit::Level::Info)),
        "warn" => Ok(Some(emit::Level::Warn)),
        "error" => Ok(Some(emit::Level::Error)),
        other => Err(other.to_string()),
    }
}

/// Initialize diagnostics from `CATSYNC_LOG`.
///
/// Safe to call more than once; only the first call has any effect.
pub fn init_diagnostics() {
    let requested = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());
    let level = match parse_level(&requested) {
        Ok(level) => level,
        Err(unknown) => {
            // Bootstrap warning, the emitter isn't running yet
            eprintln!("Warning: Unknown {LOG_ENV} value '{unknown}', using 'info'");
            Some(emit::Level::Info)
        }
    };
    init_with_level(level);
}

/// Initialize diagnostics with an explicit level, ignoring the environment.
pub fn init_with_level(level: Option<emit::Level>) {
    INIT.call_once(|| {
        let Some(level) = level else {
            return;
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the whole process
        std::mem::forget(rt);
    });
}

/// Operational events: runs started, files applied, loads committed.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Detail useful when chasing a problem: skipped entries, chunk sizes, SQL.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Recoverable oddities, e.g. a manifest line that doesn't parse.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Failures that end a run or a load.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init_with_level(None);
        init_diagnostics();
        init_diagnostics();
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("off"), Ok(None));
        assert_eq!(parse_level(""), Ok(None));
        assert_eq!(parse_level("DEBUG"), Ok(Some(emit::Level::Debug)));
        assert_eq!(parse_level(" warn "), Ok(Some(emit::Level::Warn)));
        assert_eq!(parse_level("loud"), Err("loud".to_string()));
    }

    #[test]
    fn test_macros_compile() {
        info!("Test message");
        debug!("Debug message with {value}", value: 42);
        warn!("Warning message");
        error!("Error message");
    }

    #[test]
    fn test_macros_take_caller_locals_as_properties() {
        let name = "feed_100_a.gz";
        let records = 3usize;
        info!("Applied {name} ({records} records)", name: name, records: records);
        warn!("Skipping {name}", name: name);
    }
}
