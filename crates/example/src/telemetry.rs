//! Tracing subscriber setup for the example binary.
//!
//! [`TracingConfig`] picks the log level, output format and an optional
//! target filter, then installs a `tracing_subscriber` registry. Settings can
//! come from the environment:
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `STRATUM_LOG` | `EnvFilter` directives | `info` |
//! | `STRATUM_LOG_FORMAT` | `pretty`, `compact`, `json` | `compact` |
//! | `STRATUM_LOG_SPANS` | `1` / `true` | off |

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "STRATUM_LOG";
/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "STRATUM_LOG_FORMAT";
/// Environment variable enabling span enter/exit events.
pub const LOG_SPANS_ENV: &str = "STRATUM_LOG_SPANS";

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Compact single-line output (default).
    #[default]
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

impl TracingFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    level: Level,
    format: TracingFormat,
    env_filter: Option<String>,
    span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::default(),
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from `STRATUM_LOG`, `STRATUM_LOG_FORMAT` and
    /// `STRATUM_LOG_SPANS`. Unknown formats fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var(LOG_ENV) {
            config = config.with_env_filter(filter);
        }
        if let Some(format) = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|f| TracingFormat::parse(&f))
        {
            config = config.with_format(format);
        }
        if let Ok(spans) = std::env::var(LOG_SPANS_ENV) {
            config = config.with_span_events(matches!(spans.trim(), "1" | "true"));
        }
        config
    }

    /// Sets the maximum log level used when no filter is given.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets filter directives, e.g. `stratum_graph=debug,info`.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// The configured output format.
    #[must_use]
    pub fn format(&self) -> TracingFormat {
        self.format
    }

    /// Installs the global subscriber.
    ///
    /// Does nothing if a subscriber is already installed.
    pub fn init(&self) {
        let env_filter = self.env_filter();

        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        // try_init().ok(): a second init keeps the first subscriber.
        let registry = tracing_subscriber::registry().with(env_filter);
        match self.format {
            TracingFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_span_events(span_events),
                )
                .try_init()
                .ok(),
            TracingFormat::Compact => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_span_events(span_events),
                )
                .try_init()
                .ok(),
            TracingFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(span_events),
                )
                .try_init()
                .ok(),
        };

        tracing::debug!(level = %self.level, format = ?self.format, "tracing initialized");
    }

    /// The filter `init` installs. Invalid directives fall back to the level.
    fn env_filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }
}
