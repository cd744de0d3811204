//! vidgate CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use vidgate::cli::{self, Cli, CommandContext, OutputFormat};
use vidgate::core::logging::{self, LogSettings};
use vidgate::error::GateError;
use vidgate::storage::config::{ResolvedConfig, process_env};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = ResolvedConfig::resolve(&cli);
    let config_level = config.as_ref().ok().and_then(|c| c.log_level.clone());
    let settings = LogSettings::resolve(
        cli.log_level.as_deref(),
        config_level.as_deref(),
        cli.json_output,
        cli.verbose,
        &process_env,
    );
    logging::init(&settings);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            // Config never loaded, so fall back to the flags alone.
            let format = if cli.json {
                OutputFormat::Json
            } else {
                cli.format.unwrap_or_default()
            };
            return fail(&e, format, cli.no_color, cli.pretty);
        }
    };

    tracing::debug!(
        command = ?cli.command,
        format = ?config.format,
        data_dir = %config.paths.data.display(),
        "starting"
    );
    let ctx = CommandContext::new(config);
    match cli::dispatch(&ctx, &cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e, ctx.render.format, ctx.render.no_color, ctx.render.pretty),
    }
}

fn fail(error: &GateError, format: OutputFormat, no_color: bool, pretty: bool) -> ExitCode {
    tracing::debug!(code = error.error_code(), error = %error, "command failed");
    eprintln!(
        "{}",
        vidgate::render::error::render_error(error, format, no_color, pretty)
    );
    ExitCode::from(error.exit_code() as u8)
}
