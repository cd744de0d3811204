//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::models::{GenerationSpec, GenerationStatus, Resolution};
use crate::core::provider::Provider;
use crate::error::Result;

/// vidgate - one request shape for API-only video generation services.
#[derive(Parser, Debug)]
#[command(name = "vidgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to load instead of the default
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the record database and downloaded videos
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Per-request timeout in seconds for provider calls
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate the cost of a generation without submitting it
    Estimate(SpecArgs),

    /// Submit a generation and wait for it to finish
    Generate(GenerateArgs),

    /// Show one generation
    Get(IdArgs),

    /// List generations, newest first
    List(ListArgs),

    /// Cancel a queued or processing generation
    Cancel(IdArgs),

    /// Cancel if active, then delete the record and its video
    Delete(IdArgs),

    /// Resume polling for generations interrupted by a restart
    Resume(ResumeArgs),

    /// Usage statistics
    Stats,

    /// List providers, models, and whether a key is configured
    Providers,

    /// Show the per-second rate table
    Pricing,

    /// Manage provider API keys
    #[command(subcommand)]
    Keys(KeysCommand),
}

/// Generation parameters shared by `estimate` and `generate`.
#[derive(Args, Debug, Clone)]
pub struct SpecArgs {
    /// Model name (e.g. sora-2, runway-gen4, kling-1.5)
    #[arg(long, short)]
    pub model: String,

    /// Text prompt
    pub prompt: String,

    /// Clip length in seconds
    #[arg(long, short, default_value = "5")]
    pub duration: u32,

    /// Aspect ratio (16:9, 9:16, 1:1, 4:3, 21:9)
    #[arg(long, value_name = "RATIO")]
    pub aspect_ratio: Option<String>,

    /// Explicit frame size as WIDTHxHEIGHT
    #[arg(long, value_name = "WxH")]
    pub resolution: Option<String>,

    /// Seed, for providers that support it
    #[arg(long)]
    pub seed: Option<i64>,

    /// Frames per second, for providers that support it
    #[arg(long)]
    pub fps: Option<u32>,
}

impl SpecArgs {
    /// Build and validate the generation spec.
    pub fn to_spec(&self) -> Result<GenerationSpec> {
        let resolution = self
            .resolution
            .as_deref()
            .map(str::parse::<Resolution>)
            .transpose()?;
        let spec = GenerationSpec {
            model: self.model.trim().to_string(),
            prompt: self.prompt.clone(),
            duration_seconds: self.duration,
            aspect_ratio: self.aspect_ratio.clone(),
            resolution,
            seed: self.seed,
            fps: self.fps,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Arguments for the `generate` command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Key reference to authenticate with (defaults to the provider's)
    #[arg(long, value_name = "REF")]
    pub key_ref: Option<String>,

    /// Return once the provider has accepted the job (collect it later with `resume --wait`)
    #[arg(long)]
    pub no_wait: bool,

    /// Give up waiting after this many seconds (the generation keeps its state)
    #[arg(long, value_name = "SECONDS")]
    pub wait_timeout: Option<u64>,
}

/// A single generation id.
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Generation id (gen_...)
    pub id: String,
}

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only this provider
    #[arg(long)]
    pub provider: Option<String>,

    /// Only this status
    #[arg(long)]
    pub status: Option<String>,

    /// Skip this many records
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Return at most this many records
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

impl ListArgs {
    pub fn provider_filter(&self) -> Result<Option<Provider>> {
        self.provider
            .as_deref()
            .map(Provider::from_cli_name)
            .transpose()
    }

    pub fn status_filter(&self) -> Result<Option<GenerationStatus>> {
        self.status
            .as_deref()
            .map(str::parse::<GenerationStatus>)
            .transpose()
    }
}

/// Arguments for the `resume` command.
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Keep running until every resumed generation is terminal
    #[arg(long)]
    pub wait: bool,
}

/// Key management subcommands.
#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Validate a key with the provider, then store it
    Set {
        /// Provider the key belongs to (openai, runway, kling)
        provider: String,

        /// Key reference (defaults to the provider's configured key_ref)
        #[arg(long, value_name = "REF")]
        key_ref: Option<String>,

        /// Secret value; read from stdin when omitted
        #[arg(long, value_name = "SECRET")]
        secret: Option<String>,

        /// Store without validating against the provider
        #[arg(long)]
        skip_validation: bool,
    },

    /// Re-validate a stored key with its provider
    Validate {
        provider: String,

        #[arg(long, value_name = "REF")]
        key_ref: Option<String>,
    },

    /// Remove a stored key
    Delete {
        /// Key reference to delete
        key_ref: String,
    },

    /// Show configured key references and fingerprints
    List,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// Markdown output
    Md,
}
