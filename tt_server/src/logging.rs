//! Structured logging setup and event helpers.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Queries slower than this are reported at warn level
pub const SLOW_QUERY_MS: u64 = 100;

/// Initialize the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`. Records emitted by the library through the
/// `log` facade are bridged into tracing.
///
/// # Example
///
/// ```no_run
/// use tt_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::debug!("logging initialized");
}

/// Log a security-relevant event (bad credentials, invalid tokens,
/// rate-limit denials).
///
/// # Example
///
/// ```
/// use tt_server::logging::log_security_event;
///
/// log_security_event(
///     "invalid_credentials",
///     None,
///     Some("192.168.1.1"),
///     "authentication failed",
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    user_id: Option<i64>,
    ip_address: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        ip_address = ip_address,
        "SECURITY: {}",
        message
    );
}

/// Log a store call made by a handler, flagging slow ones.
pub fn log_database_operation(operation: &str, table: &str, duration_ms: u64) {
    if duration_ms > SLOW_QUERY_MS {
        tracing::warn!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "slow database operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "database operation"
        );
    }
}
