use std::env;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// The crates of this workspace, logged at the configured level. All other
/// crates stay at `INFO`.
const CRATE_NAMES: &[&str] = &["sluice_log", "sluice_pool", "sluice_sync"];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise
    /// [`LogFormat::Simplified`].
    Auto,

    /// Compact single-line output with colors.
    Pretty,

    /// Simplified plain text output without colors.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging level.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Only log errors.
    Error,
    /// Log errors and warnings.
    Warn,
    /// Additionally log user-relevant messages. This is the default.
    Info,
    /// Additionally log debugging information.
    Debug,
    /// Log full auxiliary information.
    Trace,
}

impl Level {
    fn directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the Sluice crates.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based
    /// on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE`
    /// variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Returns the default filter directives for the given level.
fn default_filter(level: Level) -> EnvFilter {
    // Third-party crates default to INFO, workspace crates follow the
    // configured level.
    let mut filter = EnvFilter::new("info");
    for name in CRATE_NAMES {
        let directive = format!("{}={}", name, level.directive());
        filter = filter.add_directive(directive.parse().expect("static directives are valid"));
    }

    filter
}

/// Initialize the logging system.
///
/// The `RUST_LOG` environment variable takes precedence over the configured
/// level and may contain arbitrary filter directives. Calling `init` more
/// than once leaves the first subscriber in place.
///
/// # Example
///
/// ```
/// let config = sluice_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// sluice_log::init(&config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        env::set_var("RUST_BACKTRACE", "full");
    }

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => default_filter(config.level),
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => subscriber
            .with(fmt::layer().compact())
            .try_init()
            .ok(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => subscriber
            .with(fmt::layer().with_ansi(false))
            .try_init()
            .ok(),
        (LogFormat::Json, _) => subscriber
            .with(fmt::layer().json().flatten_event(true))
            .try_init()
            .ok(),
    };
}
