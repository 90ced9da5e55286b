//! Default logging.
//!
//! Installs a JSON `tracing` subscriber on stdout unless the host
//! application already installed one. `FIREFACE_DEBUG=true` raises the level
//! to `debug` and adds source locations. `RUST_LOG` still takes precedence
//! over the default level.

use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const ENV_DEBUG: &str = "FIREFACE_DEBUG";

/// Settings for the default subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// `debug` level with file and line numbers.
    pub debug: bool,
}

impl LogSettings {
    /// Read `FIREFACE_DEBUG` from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_debug_var(env::var(ENV_DEBUG).ok().as_deref())
    }

    /// Only the exact value `true` enables debug.
    #[must_use]
    pub fn from_debug_var(value: Option<&str>) -> Self {
        Self {
            debug: value == Some("true"),
        }
    }

    #[must_use]
    pub fn default_directive(self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Install the default subscriber.
///
/// Returns `false` when a global subscriber already exists; it is left in
/// place.
pub fn init_logging(settings: LogSettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_directive()));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_file(settings.debug)
                .with_line_number(settings.debug),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(target: "fireface.app", debug = settings.debug, "Logging initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_var_parsing() {
        assert!(LogSettings::from_debug_var(Some("true")).debug);
        assert!(!LogSettings::from_debug_var(Some("TRUE")).debug);
        assert!(!LogSettings::from_debug_var(Some("1")).debug);
        assert!(!LogSettings::from_debug_var(None).debug);
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(LogSettings { debug: true }.default_directive(), "debug");
        assert_eq!(LogSettings::default().default_directive(), "info");
    }

    #[test]
    fn test_second_init_keeps_existing_subscriber() {
        // Whichever call wins, the next one must report the existing subscriber.
        let _ = init_logging(LogSettings::default());
        assert!(!init_logging(LogSettings { debug: true }));
    }
}
