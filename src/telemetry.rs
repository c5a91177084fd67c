use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { directives: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { directives, .. } => {
                write!(f, "invalid log filter '{directives}': unable to build EnvFilter")
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Filter applied when `RUST_LOG` is unset: the configured level for this
/// crate, with the HTTP client stacks capped at `warn` so assignment logs
/// are not drowned out by per-request connection chatter.
fn default_directives(level: &str) -> String {
    format!("{level},shiftpool={level},hyper=warn,reqwest=warn")
}

/// Installs the global subscriber.
///
/// The scheduling modules log business-rule rejections at info/debug and
/// reserve `error` for infrastructure faults, so running at `info` shows
/// every assignment decision without stack noise.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = default_directives(&config.log_level);
            EnvFilter::try_new(&directives)
                .map_err(|source| TelemetryError::EnvFilter { directives, source })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_scope_the_crate_and_quiet_http() {
        let directives = default_directives("debug");
        assert!(directives.contains("shiftpool=debug"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn malformed_level_fails_to_build_a_filter() {
        assert!(EnvFilter::try_new(&default_directives("not=a=level")).is_err());
    }
}
