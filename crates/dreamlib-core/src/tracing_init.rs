//! Logging setup for the `dreamlib-server` binary.
//!
//! `RUST_LOG` wins when set and non-blank; otherwise [`DEFAULT_FILTER`]
//! keeps our crates and the HTTP trace layer at `info`.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "dreamlib_server=info,dreamlib_core=info,tower_http=info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for a terminal or journald.
    Text,
    /// One JSON object per event, with the current request span attached.
    Json,
}

impl LogFormat {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Filter directives: the `RUST_LOG` value unless it is missing or blank.
pub fn filter_directives(rust_log: Option<&str>, default_filter: &str) -> String {
    rust_log
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default_filter)
        .to_string()
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = EnvFilter::new(filter_directives(rust_log.as_deref(), default_filter));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_rust_log_falls_back_to_default() {
        assert_eq!(filter_directives(None, DEFAULT_FILTER), DEFAULT_FILTER);
        assert_eq!(filter_directives(Some("  "), DEFAULT_FILTER), DEFAULT_FILTER);
        assert_eq!(
            filter_directives(Some(" dreamlib_core=debug "), DEFAULT_FILTER),
            "dreamlib_core=debug"
        );
    }

    #[test]
    fn json_flag_picks_format() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Text);
    }
}
