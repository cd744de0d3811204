//! Configuration file loading and resolution.
//!
//! Loads `config.toml` from the platform config directory
//! (`~/.config/vidgate/config.toml` on Linux), or from the path in
//! `--config` / `VIDGATE_CONFIG`.
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `VIDGATE_CONFIG`: Override config file path
//! - `VIDGATE_FORMAT`: Output format (human, json, md)
//! - `VIDGATE_TIMEOUT`: Per-request timeout in seconds
//! - `VIDGATE_POLL_INTERVAL_MS`: Delay between status checks
//! - `VIDGATE_POLL_MAX_ATTEMPTS`: Status checks before a generation times out
//! - `VIDGATE_NO_COLOR` or `NO_COLOR`: Disable colors
//! - `VIDGATE_PRETTY`: Pretty-print JSON output
//! - `VIDGATE_DATA_DIR`: Directory for the record database and videos

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::{Cli, OutputFormat};
use crate::core::poller::PollPolicy;
use crate::core::provider::Provider;
use crate::error::{GateError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const ENV_CONFIG: &str = "VIDGATE_CONFIG";
pub const ENV_FORMAT: &str = "VIDGATE_FORMAT";
pub const ENV_TIMEOUT: &str = "VIDGATE_TIMEOUT";
pub const ENV_POLL_INTERVAL_MS: &str = "VIDGATE_POLL_INTERVAL_MS";
pub const ENV_POLL_MAX_ATTEMPTS: &str = "VIDGATE_POLL_MAX_ATTEMPTS";
pub const ENV_NO_COLOR: &str = "VIDGATE_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
pub const ENV_PRETTY: &str = "VIDGATE_PRETTY";
pub const ENV_DATA_DIR: &str = "VIDGATE_DATA_DIR";

const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;
const MAX_FETCH_TIMEOUT_SECS: u64 = 3600;
const MAX_POLL_INTERVAL_MS: u64 = 600_000;
const MAX_POLL_ATTEMPTS: u32 = 10_000;

/// Reads an environment variable. Swapped out in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// [`EnvLookup`] over the real process environment.
#[must_use]
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Final configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub format: OutputFormat,
    pub pretty: bool,
    pub no_color: bool,
    /// Per status/submit call.
    pub request_timeout: Duration,
    /// Per content download.
    pub fetch_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    /// Config, cache, and data directories.
    pub paths: AppPaths,
    pub videos_dir: PathBuf,
    pub log_level: Option<String>,
    pub providers: HashMap<Provider, ProviderSettings>,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub format: ConfigSource,
    pub pretty: ConfigSource,
    pub no_color: ConfigSource,
    pub request_timeout: ConfigSource,
    pub poll_interval: ConfigSource,
    pub poll_max_attempts: ConfigSource,
    pub data_dir: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    Env,
    ConfigFile,
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve from CLI args, the process environment, and the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named config file is missing, the
    /// file is invalid, or any resolved value is out of bounds.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config = Self::load_config(cli, &process_env)?;
        Self::from_parts(cli, config, &process_env)
    }

    /// Merge an already-loaded config with CLI flags and `env`.
    pub fn from_parts(cli: &Cli, config: Config, env: EnvLookup<'_>) -> Result<Self> {
        config.validate()?;
        let mut sources = ConfigSources::default();

        let format = Self::resolve_format(cli, &config, env, &mut sources.format)?;
        let pretty = Self::resolve_flag(
            cli.pretty,
            Self::is_env_truthy(env, ENV_PRETTY),
            config.output.pretty,
            &mut sources.pretty,
        );
        let no_color = Self::resolve_flag(
            cli.no_color,
            Self::is_env_truthy(env, ENV_NO_COLOR) || env(ENV_NO_COLOR_STD).is_some(),
            !config.output.color,
            &mut sources.no_color,
        );

        let request_timeout_secs = Self::resolve_number(
            cli.timeout,
            env,
            ENV_TIMEOUT,
            config.general.request_timeout_seconds,
            &mut sources.request_timeout,
        );
        check_range("timeout", request_timeout_secs, 1, MAX_REQUEST_TIMEOUT_SECS)?;

        let interval_ms = Self::resolve_number(
            None,
            env,
            ENV_POLL_INTERVAL_MS,
            config.polling.interval_ms,
            &mut sources.poll_interval,
        );
        check_range("polling.interval_ms", interval_ms, 1, MAX_POLL_INTERVAL_MS)?;

        let poll_max_attempts = Self::resolve_number(
            None,
            env,
            ENV_POLL_MAX_ATTEMPTS,
            config.polling.max_attempts,
            &mut sources.poll_max_attempts,
        );
        check_range(
            "polling.max_attempts",
            u64::from(poll_max_attempts),
            1,
            u64::from(MAX_POLL_ATTEMPTS),
        )?;

        let paths = Self::resolve_paths(cli, &config, env, &mut sources.data_dir);
        let videos_dir = config
            .storage
            .videos_dir
            .clone()
            .unwrap_or_else(|| paths.videos_dir());

        let providers = Provider::ALL
            .iter()
            .map(|&provider| (provider, config.providers.get(provider).clone()))
            .collect();

        Ok(Self {
            format,
            pretty,
            no_color,
            request_timeout: Duration::from_secs(request_timeout_secs),
            fetch_timeout: Duration::from_secs(config.general.fetch_timeout_seconds),
            poll_interval: Duration::from_millis(interval_ms),
            poll_max_attempts,
            paths,
            videos_dir,
            log_level: config.general.log_level.clone(),
            providers,
            sources,
        })
    }

    /// Polling and timeout settings for the orchestrator.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            max_attempts: self.poll_max_attempts,
            request_timeout: self.request_timeout,
            fetch_timeout: self.fetch_timeout,
        }
    }

    /// Settings for one provider (defaults if not configured).
    #[must_use]
    pub fn provider(&self, provider: Provider) -> ProviderSettings {
        self.providers.get(&provider).cloned().unwrap_or_default()
    }

    /// Key ref new generations for `provider` authenticate with.
    #[must_use]
    pub fn key_ref(&self, provider: Provider) -> String {
        self.provider(provider).key_ref_or_default(provider)
    }

    /// Load the config file named by `--config`, `VIDGATE_CONFIG`, or the
    /// default location. Only the default location may be absent.
    fn load_config(cli: &Cli, env: EnvLookup<'_>) -> Result<Config> {
        if let Some(path) = &cli.config {
            return Config::load_required(path);
        }
        if let Some(path) = env(ENV_CONFIG) {
            return Config::load_required(Path::new(&path));
        }
        Config::load()
    }

    fn resolve_format(
        cli: &Cli,
        config: &Config,
        env: EnvLookup<'_>,
        source: &mut ConfigSource,
    ) -> Result<OutputFormat> {
        // 1. CLI --json shorthand, then --format
        if cli.json {
            *source = ConfigSource::Cli;
            return Ok(OutputFormat::Json);
        }
        if let Some(format) = cli.format {
            *source = ConfigSource::Cli;
            return Ok(format);
        }

        // 2. Environment variable
        if let Some(format_env) = env(ENV_FORMAT) {
            *source = ConfigSource::Env;
            return Self::parse_format(&format_env);
        }

        // 3. Config file
        if let Some(ref format_str) = config.output.format {
            *source = ConfigSource::ConfigFile;
            return Self::parse_format(format_str);
        }

        *source = ConfigSource::Default;
        Ok(OutputFormat::Human)
    }

    /// Parse a format string into `OutputFormat`.
    pub fn parse_format(s: &str) -> Result<OutputFormat> {
        match s.trim().to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "md" | "markdown" => Ok(OutputFormat::Md),
            _ => Err(GateError::ConfigInvalid {
                key: "format".to_string(),
                value: s.to_string(),
                message: "valid formats: human, json, md".to_string(),
            }),
        }
    }

    /// Boolean switch that can only be turned on by each layer.
    const fn resolve_flag(cli: bool, env: bool, file: bool, source: &mut ConfigSource) -> bool {
        if cli {
            *source = ConfigSource::Cli;
            true
        } else if env {
            *source = ConfigSource::Env;
            true
        } else if file {
            *source = ConfigSource::ConfigFile;
            true
        } else {
            *source = ConfigSource::Default;
            false
        }
    }

    /// Numeric setting: CLI, then a parseable env var, then the file value.
    fn resolve_number<T: std::str::FromStr + Copy>(
        cli: Option<T>,
        env: EnvLookup<'_>,
        var: &str,
        file: T,
        source: &mut ConfigSource,
    ) -> T {
        if let Some(value) = cli {
            *source = ConfigSource::Cli;
            return value;
        }
        if let Some(raw) = env(var) {
            if let Ok(value) = raw.trim().parse::<T>() {
                *source = ConfigSource::Env;
                return value;
            }
            tracing::warn!(var, value = %raw, "ignoring unparseable environment variable");
        }
        *source = ConfigSource::ConfigFile;
        file
    }

    fn resolve_paths(
        cli: &Cli,
        config: &Config,
        env: EnvLookup<'_>,
        source: &mut ConfigSource,
    ) -> AppPaths {
        let mut paths = AppPaths::new();
        let data_dir = if let Some(dir) = &cli.data_dir {
            *source = ConfigSource::Cli;
            Some(dir.clone())
        } else if let Some(dir) = env(ENV_DATA_DIR) {
            *source = ConfigSource::Env;
            Some(PathBuf::from(dir))
        } else if let Some(dir) = &config.storage.data_dir {
            *source = ConfigSource::ConfigFile;
            Some(dir.clone())
        } else {
            *source = ConfigSource::Default;
            None
        };
        if let Some(dir) = data_dir {
            paths.data = dir;
        }
        paths
    }

    fn is_env_truthy(env: EnvLookup<'_>, var: &str) -> bool {
        env(var).is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    }
}

fn check_range(key: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(GateError::ConfigInvalid {
            key: key.to_string(),
            value: value.to_string(),
            message: format!("must be between {min} and {max}"),
        })
    }
}

// =============================================================================
// File Configuration
// =============================================================================

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
    pub providers: ProvidersConfig,
    pub output: OutputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Timeout for submit and status calls in seconds.
    pub request_timeout_seconds: u64,
    /// Timeout for a content download in seconds.
    pub fetch_timeout_seconds: u64,
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            fetch_timeout_seconds: 300,
            log_level: None,
        }
    }
}

/// Status polling budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_attempts: 120,
        }
    }
}

/// Where records and videos live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/videos`.
    pub videos_dir: Option<PathBuf>,
}

/// Per-provider tables: `[providers.openai]`, `[providers.runway]`,
/// `[providers.kling]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderSettings,
    pub runway: ProviderSettings,
    pub kling: ProviderSettings,
}

impl ProvidersConfig {
    #[must_use]
    pub const fn get(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Runway => &self.runway,
            Provider::Kling => &self.kling,
        }
    }
}

/// Settings for a specific provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Disabled providers get no adapter; their models are rejected.
    pub enabled: bool,
    /// Custom API base URL (if different from default).
    pub api_base: Option<String>,
    /// Credential reference used for new generations.
    pub key_ref: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: None,
            key_ref: None,
        }
    }
}

impl ProviderSettings {
    #[must_use]
    pub fn key_ref_or_default(&self, provider: Provider) -> String {
        self.key_ref
            .clone()
            .unwrap_or_else(|| provider.default_key_ref().to_string())
    }

    #[must_use]
    pub fn api_base_or_default(&self, provider: Provider) -> String {
        self.api_base
            .clone()
            .unwrap_or_else(|| provider.default_api_base().to_string())
    }
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format (human, json, md).
    pub format: Option<String>,
    pub color: bool,
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: None,
            color: true,
            pretty: false,
        }
    }
}

impl Config {
    /// Load from the default config file path, or defaults if it is absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::read(path)
    }

    /// Load from `path`, which must exist.
    pub fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GateError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self> {
        tracing::debug!(?path, "loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GateError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| GateError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        tracing::debug!(?path, "config file saved");
        Ok(())
    }

    /// Bounds-check file values.
    pub fn validate(&self) -> Result<()> {
        check_range(
            "general.request_timeout_seconds",
            self.general.request_timeout_seconds,
            1,
            MAX_REQUEST_TIMEOUT_SECS,
        )?;
        check_range(
            "general.fetch_timeout_seconds",
            self.general.fetch_timeout_seconds,
            1,
            MAX_FETCH_TIMEOUT_SECS,
        )?;
        check_range("polling.interval_ms", self.polling.interval_ms, 1, MAX_POLL_INTERVAL_MS)?;
        check_range(
            "polling.max_attempts",
            u64::from(self.polling.max_attempts),
            1,
            u64::from(MAX_POLL_ATTEMPTS),
        )?;

        if let Some(format) = &self.output.format {
            ResolvedConfig::parse_format(format)?;
        }

        if let Some(level) = &self.general.log_level {
            if crate::core::logging::LogLevel::from_arg(level).is_none() {
                return Err(GateError::ConfigInvalid {
                    key: "general.log_level".to_string(),
                    value: level.clone(),
                    message: "valid levels: error, warn, info, debug, trace".to_string(),
                });
            }
        }

        for &provider in Provider::ALL {
            let settings = self.providers.get(provider);
            if let Some(base) = &settings.api_base {
                if !(base.starts_with("http://") || base.starts_with("https://")) {
                    return Err(GateError::ConfigInvalid {
                        key: format!("providers.{}.api_base", provider.cli_name()),
                        value: base.clone(),
                        message: "must be an http(s) URL".to_string(),
                    });
                }
            }
            if settings.key_ref.as_deref().is_some_and(|r| r.trim().is_empty()) {
                return Err(GateError::ConfigInvalid {
                    key: format!("providers.{}.key_ref", provider.cli_name()),
                    value: String::new(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
