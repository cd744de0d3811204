//! Diagnostic logging to stderr or a file.
//!
//! Pipelines log with structured fields (`generation_id`, `provider`,
//! `job_id`, `attempt`). Secrets never reach a log line; only the SHA-256
//! fingerprint of a credential does.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::storage::config::EnvLookup;

pub const LOG_LEVEL_ENV: &str = "VIDGATE_LOG";
pub const LOG_FORMAT_ENV: &str = "VIDGATE_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "VIDGATE_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Json,
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Verbosity, least to most.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" | "verbose" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Resolved logging setup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Level: `--log-level` > `VIDGATE_LOG` > config > warn, raised to at
    /// least debug by `--verbose`. Format: `--json-output` >
    /// `VIDGATE_LOG_FORMAT` > human.
    #[must_use]
    pub fn resolve(
        cli_level: Option<&str>,
        config_level: Option<&str>,
        json_output: bool,
        verbose: bool,
        env: EnvLookup<'_>,
    ) -> Self {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let level = cli_level
            .and_then(LogLevel::from_arg)
            .or_else(|| non_empty(LOG_LEVEL_ENV).as_deref().and_then(LogLevel::from_arg))
            .or_else(|| config_level.and_then(LogLevel::from_arg))
            .unwrap_or_default();
        let level = if verbose { level.max(LogLevel::Debug) } else { level };

        let format = if json_output {
            LogFormat::Json
        } else {
            non_empty(LOG_FORMAT_ENV)
                .as_deref()
                .and_then(LogFormat::from_arg)
                .unwrap_or_default()
        };

        let file = non_empty(LOG_FILE_ENV).map(|v| PathBuf::from(v.trim()));

        Self { level, format, file }
    }

    /// Default directive when `RUST_LOG` is not set.
    #[must_use]
    pub fn directive(&self) -> String {
        format!("vidgate={}", self.level.as_filter())
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new().create(true).append(true).open(path).ok()
    });
    let file_failed = settings.file.is_some() && file.is_none();

    let writer = |file: Option<&File>| -> BoxMakeWriter {
        match file.and_then(|inner| inner.try_clone().ok()) {
            Some(handle) => BoxMakeWriter::new(handle),
            None => BoxMakeWriter::new(std::io::stderr),
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer(file.as_ref()));
    match settings.format {
        LogFormat::Json => builder
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .ok(),
        LogFormat::Compact => builder.compact().with_target(true).try_init().ok(),
        LogFormat::Human => builder.with_target(false).without_time().try_init().ok(),
    };

    if file_failed {
        tracing::warn!(path = ?settings.file, "could not open log file, logging to stderr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn level_precedence() {
        let env = env_of(&[(LOG_LEVEL_ENV, "info")]);
        let cli = LogSettings::resolve(Some("trace"), Some("error"), false, false, &env);
        assert_eq!(cli.level, LogLevel::Trace);

        let from_env = LogSettings::resolve(None, Some("error"), false, false, &env);
        assert_eq!(from_env.level, LogLevel::Info);

        let none = env_of(&[]);
        let from_config = LogSettings::resolve(None, Some("error"), false, false, &none);
        assert_eq!(from_config.level, LogLevel::Error);

        assert_eq!(LogSettings::resolve(None, None, false, false, &none).level, LogLevel::Warn);
    }

    #[test]
    fn verbose_raises_but_never_lowers() {
        let none = env_of(&[]);
        assert_eq!(LogSettings::resolve(None, None, false, true, &none).level, LogLevel::Debug);
        assert_eq!(
            LogSettings::resolve(Some("trace"), None, false, true, &none).level,
            LogLevel::Trace
        );
    }

    #[test]
    fn format_and_file() {
        let env = env_of(&[(LOG_FORMAT_ENV, "compact"), (LOG_FILE_ENV, " /tmp/vg.log ")]);
        let settings = LogSettings::resolve(None, None, false, false, &env);
        assert_eq!(settings.format, LogFormat::Compact);
        assert_eq!(settings.file, Some(PathBuf::from("/tmp/vg.log")));

        let json = LogSettings::resolve(None, None, true, false, &env);
        assert_eq!(json.format, LogFormat::Json);
    }

    #[test]
    fn blank_env_is_ignored() {
        let env = env_of(&[(LOG_LEVEL_ENV, "  "), (LOG_FILE_ENV, "")]);
        let settings = LogSettings::resolve(None, None, false, false, &env);
        assert_eq!(settings.level, LogLevel::Warn);
        assert!(settings.file.is_none());
        assert_eq!(settings.directive(), "vidgate=warn");
    }
}
