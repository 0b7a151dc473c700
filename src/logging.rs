//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//!
//! - Level from `LOG_LEVEL`, then `RUST_LOG`, then the `RELAY_ENV` default
//! - JSON lines when `LOG_FORMAT=json`, human-readable otherwise
//! - ANSI colors only when stdout is a TTY
//! - Run- and channel-scoped structured logging macros

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging
///
/// Safe to call more than once and safe to call when another subscriber is
/// already installed (e.g. by a test harness); later calls are no-ops.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();

        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                json = json,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }
    });
}

/// Current deployment environment (`RELAY_ENV`, default `development`)
pub fn get_environment() -> String {
    std::env::var("RELAY_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        return level.to_lowercase();
    }

    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }

    default_level_for(environment).to_string()
}

fn default_level_for(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log plan execution events, keyed by run
#[macro_export]
macro_rules! log_run {
    // Full form with run_id
    ($level:ident, $operation:expr, run_id: $run_id:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            run_id = %$run_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "RUN_{}", $operation
        );
    };
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "RUN_{}", $operation
        );
    };
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "RUN_{}", $operation
        );
    };
}

/// Log stream-level events (publish, read, ack)
#[macro_export]
macro_rules! log_channel {
    // Full form with stream
    ($level:ident, $operation:expr, stream: $stream:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            stream = %$stream,
            $($key = ?$value,)*
            "CHANNEL_{} (stream: {})", $operation, $stream
        );
    };
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            "CHANNEL_{}", $operation
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_levels() {
        assert_eq!(default_level_for("production"), "info");
        assert_eq!(default_level_for("development"), "debug");
        assert_eq!(default_level_for("test"), "debug");
        assert_eq!(default_level_for("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        crate::log_run!(debug, "TEST_EVENT", run_id: uuid::Uuid::nil(), step: 0usize);
        crate::log_channel!(debug, "TEST_EVENT", stream: "robot.tasks", count: 1usize);
    }
}
