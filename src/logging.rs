//! Host-side logger setup.
//!
//! The library only talks to the `log` facade. A host binary calls
//! `init_logging` before its first export.

use std::sync::Once;

/// Used when neither the config nor `RUST_LOG` names a filter. SVG parsing
/// and the HTTP stack are chatty at info level.
pub const DEFAULT_FILTER: &str = "info,usvg=warn,resvg=warn,reqwest=warn,hyper=warn";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `env_logger` filter directives, e.g. "floorplan_export_core=debug".
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

/// Explicit filter, then the environment value, then `DEFAULT_FILTER`.
pub fn resolve_filter(explicit: Option<&str>, env: Option<&str>) -> String {
    explicit
        .or(env)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

static INIT: Once = Once::new();

/// Only the first call has an effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let env = std::env::var("RUST_LOG").ok();
        let filter = resolve_filter(config.env_filter.as_deref(), env.as_deref());

        env_logger::Builder::new()
            .parse_filters(&filter)
            .write_style(config.write_style)
            // stdout carries the report JSON
            .target(env_logger::Target::Stderr)
            .init();

        log::debug!("logger ready ({})", filter);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(resolve_filter(Some("debug"), Some("warn")), "debug");
        assert_eq!(resolve_filter(None, Some("warn")), "warn");
        assert_eq!(resolve_filter(None, None), DEFAULT_FILTER);
        assert_eq!(resolve_filter(Some("  "), None), DEFAULT_FILTER);
    }
}
