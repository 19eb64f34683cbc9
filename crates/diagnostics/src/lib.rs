// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging for the table clone workspace
//!
//! Output is configured once per process from the TABLECLONE_LOG
//! environment variable:
//! - TABLECLONE_LOG=off (default) - no logs
//! - TABLECLONE_LOG=info - transfer progress
//! - TABLECLONE_LOG=debug - per-request timings
//!
//! Request-scoped fields are not kept in process state. Each invocation builds
//! a [`LogContext`] and hands it to every engine call, which attaches its
//! fields to the events it emits.

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

static INIT: Once = Once::new();

/// Environment variable selecting the minimum emitted level
pub const LOG_ENV: &str = "TABLECLONE_LOG";

fn level_for(value: &str) -> Option<emit::Level> {
    match value {
        "off" => None,
        "debug" => Some(emit::Level::Debug),
        "info" => Some(emit::Level::Info),
        "warn" => Some(emit::Level::Warn),
        "error" => Some(emit::Level::Error),
        _ => Some(emit::Level::Info),
    }
}

/// Initialize diagnostics based on the TABLECLONE_LOG environment variable
///
/// Safe to call multiple times - subsequent calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());

        let Some(level) = level_for(log_level.as_str()) else {
            return;
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime must outlive every invocation in the process.
        std::mem::forget(rt);
    });
}

/// Request-scoped logging fields for one invocation
///
/// Built at the invocation boundary and passed by reference through the
/// engines; nothing request-specific is stored globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub request_id: String,
    pub table: String,
}

impl LogContext {
    pub fn new(request_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            table: table.into(),
        }
    }

    /// Same request, different table (schema import logs the destination)
    #[must_use]
    pub fn for_table(&self, table: impl Into<String>) -> Self {
        Self {
            request_id: self.request_id.clone(),
            table: table.into(),
        }
    }
}

/// Log basic operations (scans started, shards stored, tables created)
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detailed diagnostics (request timings, page sizes)
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log warning conditions (throttling, budget expiry, provisioned billing)
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that end an invocation
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;
