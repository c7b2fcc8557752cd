//! Tracing setup for binaries built on this crate.

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Output encoding selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }

    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer().with_writer(std::io::stderr);
        match self {
            Self::Text => base.boxed(),
            Self::Json => base.json().boxed(),
        }
    }
}

/// Build the level filter from `RUST_LOG`, falling back to `SLOT_LOG`.
pub fn env_filter() -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let level = base_level(std::env::var("SLOT_LOG").ok().as_deref());
    EnvFilter::new(format!("logical_slot={level},slot_stress={level}"))
}

fn base_level(slot_log: Option<&str>) -> &'static str {
    match slot_log {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

/// Install the global subscriber, writing to stderr so stdout stays free for
/// reports.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// is kept.
pub fn init_tracing() -> bool {
    let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());

    tracing_subscriber::registry()
        .with(format.layer())
        .with(env_filter())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_level_defaults_to_info() {
        assert_eq!(base_level(None), "info");
        assert_eq!(base_level(Some("verbose")), "info");
    }

    #[test]
    fn base_level_accepts_aliases() {
        assert_eq!(base_level(Some("warning")), "warn");
        assert_eq!(base_level(Some("warn")), "warn");
        assert_eq!(base_level(Some("debug")), "debug");
        assert_eq!(base_level(Some("error")), "error");
    }

    #[test]
    fn log_format_reads_json_only() {
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("pretty")), LogFormat::Text);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Text);
    }

    #[test]
    fn second_init_keeps_first_subscriber() {
        init_tracing();
        assert!(!init_tracing());
    }
}
