//! # Structured Logging Module
//!
//! Environment-aware structured logging for batch runs. Console output is
//! human readable by default and switches to JSON lines when configured.

use crate::config::{LogFormat, LoggingConfig};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(effective_level(config, &environment)));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match config.format {
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json(),
                )
                .try_init(),
        };

        // A global subscriber may already be installed by the host application
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            format = ?config.format,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("BULKFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Test runs always log at debug; otherwise the configured level applies
fn effective_level(config: &LoggingConfig, environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        _ => config.level.clone(),
    }
}

/// Log structured data for session operations
pub fn log_session_operation(
    operation: &str,
    session_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        session_id = %session_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "SESSION_OPERATION"
    );
}

/// Log structured data for item operations
pub fn log_item_operation(
    operation: &str,
    session_id: &str,
    item_id: &str,
    status: &str,
    attempts: u32,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        session_id = %session_id,
        item_id = %item_id,
        status = %status,
        attempts = attempts,
        details = details,
        "ITEM_OPERATION"
    );
}

/// Log structured data for phase sequencer operations
pub fn log_phase_operation(operation: &str, from: &str, to: &str, status: &str) {
    tracing::info!(
        operation = %operation,
        from = %from,
        to = %to,
        status = %status,
        "PHASE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
