//! Project-wide utility for initializing logging.
use serde::Deserialize;
use snafu::ResultExt;
use std::env;
use tracing::Subscriber;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, EnvFilter, Registry};

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::INFO;

const LOG_FILTER_ENV_VAR: &str = "KUBEDRAINER_LOG";
const LOG_FORMAT_ENV_VAR: &str = "KUBEDRAINER_LOG_FORMAT";
const LOG_ANSI_ENV_VAR: &str = "KUBEDRAINER_LOG_ANSI";

/// How log lines are rendered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct LogFormatter {
    message_format: MessageFormat,
    ansi_enabled: bool,
}

impl LogFormatter {
    pub fn new(message_format: MessageFormat, ansi_enabled: bool) -> Self {
        LogFormatter {
            message_format,
            ansi_enabled,
        }
    }

    pub fn try_from_env() -> Result<Self> {
        Self::from_values(
            env::var(LOG_FORMAT_ENV_VAR).ok().as_deref(),
            env::var(LOG_ANSI_ENV_VAR).ok().as_deref(),
        )
    }

    fn from_values(format: Option<&str>, ansi: Option<&str>) -> Result<Self> {
        let message_format = match format {
            Some(format) => serde_plain::from_str(&format.to_lowercase())
                .context(error::LogFormatEnvSnafu { env_value: format })?,
            None => MessageFormat::default(),
        };
        let ansi_enabled = match ansi {
            Some(ansi) => ansi
                .to_lowercase()
                .parse()
                .context(error::LogAnsiEnvSnafu { env_value: ansi })?,
            None => false,
        };
        Ok(Self::new(message_format, ansi_enabled))
    }

    fn add_format_layer<S>(&self, event_subscriber: S) -> Box<dyn Subscriber + Send + Sync>
    where
        S: SubscriberExt + Send + Sync + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        // Each format is a distinct layer type, so the whole subscriber is boxed per branch.
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(self.ansi_enabled);
        match self.message_format {
            MessageFormat::Full => Box::new(event_subscriber.with(layer)),
            MessageFormat::Compact => Box::new(event_subscriber.with(layer.compact())),
            MessageFormat::Pretty => Box::new(event_subscriber.with(layer.pretty())),
            MessageFormat::Json => Box::new(event_subscriber.with(layer.json())),
        }
    }
}

/// See https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/format/index.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Single-line logs. This reads like the progress lines of `kubectl drain`.
    #[default]
    Full,
    Compact,
    Pretty,
    /// Newline-delimited JSON, for log collectors.
    Json,
}

/// Installs the global subscriber. Verbosity comes from `KUBEDRAINER_LOG`, which takes
/// `EnvFilter` directives such as `debug` or `models=debug,kube=warn`.
pub fn init_telemetry_from_env() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(DEFAULT_LOG_LEVEL.into())
        .with_env_var(LOG_FILTER_ENV_VAR)
        .from_env_lossy();

    let subscriber = Registry::default().with(env_filter);
    let subscriber = LogFormatter::try_from_env()?.add_format_layer(subscriber);

    tracing::subscriber::set_global_default(subscriber)
        .context(error::TracingConfigurationSnafu)?;

    Ok(())
}

pub mod error {
    use super::*;
    use snafu::Snafu;
    use std::str::ParseBoolError;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TelemetryConfigError {
        #[snafu(display("Error configuring logging: '{}'", source))]
        TracingConfiguration {
            source: tracing::subscriber::SetGlobalDefaultError,
        },

        #[snafu(display(
            "Could not parse log format from environment variable '{}={}': '{}'",
            LOG_FORMAT_ENV_VAR,
            env_value,
            source
        ))]
        LogFormatEnv {
            source: serde_plain::Error,
            env_value: String,
        },

        #[snafu(display(
            "Could not parse ANSI enablement from environment variable '{}={}': '{}'",
            LOG_ANSI_ENV_VAR,
            env_value,
            source
        ))]
        LogAnsiEnv {
            source: ParseBoolError,
            env_value: String,
        },
    }
}

type Result<T> = std::result::Result<T, TelemetryConfigError>;
pub use error::TelemetryConfigError;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_formatter_values() {
        assert_eq!(
            LogFormatter::from_values(None, None).unwrap(),
            LogFormatter::new(MessageFormat::Full, false)
        );
        assert_eq!(
            LogFormatter::from_values(Some("JSON"), Some("True")).unwrap(),
            LogFormatter::new(MessageFormat::Json, true)
        );
        assert!(matches!(
            LogFormatter::from_values(Some("fancy"), None),
            Err(TelemetryConfigError::LogFormatEnv { .. })
        ));
        assert!(matches!(
            LogFormatter::from_values(None, Some("sometimes")),
            Err(TelemetryConfigError::LogAnsiEnv { .. })
        ));
    }
}
