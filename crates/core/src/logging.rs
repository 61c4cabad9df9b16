//! Logging for lexrag.
//!
//! Events go to stderr; stdout carries answers and `--json` payloads.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Initialize the tracing subscriber.
///
/// `log_level` wins over `RUST_LOG`; both fall back to `info`. Noisy HTTP
/// internals are capped at `warn` unless the filter names them explicitly.
///
/// # Example
/// ```no_run
/// use lexrag_core::logging::init_logging;
///
/// init_logging(Some("debug"), true).expect("Failed to initialize logging");
/// ```
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> AppResult<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_str = build_filter(log_level.unwrap_or(&default_level));

    let env_filter = EnvFilter::try_new(&filter_str)
        .map_err(|e| AppError::Config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(!no_color && supports_color());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))?;

    Ok(())
}

fn build_filter(level: &str) -> String {
    let mut filter = level.to_string();
    for target in ["hyper", "reqwest", "h2"] {
        if !level.contains(target) {
            filter.push_str(&format!(",{}=warn", target));
        }
    }
    filter
}

fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}
