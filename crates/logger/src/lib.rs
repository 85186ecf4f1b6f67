use std::env::var;

use tracing::warn;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::level_filters::LevelFilter;

/// Output format selected through `RUST_LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// `json` selects JSON lines, anything else the compact format
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }

    fn from_env() -> Self {
        var("RUST_LOG_FORMAT").map(|value| Self::parse(&value)).unwrap_or(LogFormat::Compact)
    }
}

pub fn init() {
    init_with_level(LevelFilter::INFO);
}

/// Initialize the global subscriber. `RUST_LOG` directives override `level`.
pub fn init_with_level(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    let format = LogFormat::from_env();

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    if let Err(error) = tracing_subscriber::registry().with(log_layer).try_init() {
        warn!("Tracing subscriber already installed, keeping it: {error}");
    }
}

/// Test-friendly subscriber writing through the test harness; repeated calls are ignored.
pub fn try_init_for_tests() {
    let env_filter =
        EnvFilter::builder().with_default_directive(LevelFilter::DEBUG.into()).from_env_lossy();
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter(env_filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    }

    #[test]
    fn test_try_init_for_tests_is_idempotent() {
        try_init_for_tests();
        try_init_for_tests();
        tracing::info!("logger initialised twice without panicking");
    }
}
