//! `vidgate generate`: submit, then follow the generation until it ends.
//!
//! Status changes go to stderr so stdout carries only the final record.
//! Ctrl-C cancels the generation.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use crate::cli::args::{GenerateArgs, OutputFormat};
use crate::cli::context::CommandContext;
use crate::core::models::{FailureKind, GenerationRecord, GenerationStatus};
use crate::core::orchestrator::Orchestrator;
use crate::core::provider::Provider;
use crate::error::{GateError, Result};
use crate::render::{self, human};

/// Slack on top of the poll budget and download timeout.
const WAIT_SLACK: Duration = Duration::from_secs(30);
const SUBMIT_CHECK: Duration = Duration::from_millis(100);

pub async fn execute(ctx: &CommandContext, args: &GenerateArgs) -> Result<()> {
    let spec = args.spec.to_spec()?;
    let provider = Provider::for_model(&spec.model)?;
    let key_ref = ctx.key_ref_for(provider, args.key_ref.as_deref());
    let orchestrator = ctx.orchestrator()?;

    let record = orchestrator.create(spec, &key_ref).await?;
    if args.no_wait {
        let limit = orchestrator.policy().request_timeout + WAIT_SLACK;
        let submitted = until_submitted(&orchestrator, &record.id, limit).await;
        orchestrator.shutdown().await;
        ctx.emit(&render::render_record("generate", &submitted?, ctx.render)?);
        return Ok(());
    }

    let timeout = args.wait_timeout.map_or_else(
        || {
            let policy = orchestrator.policy();
            policy.max_wait() + policy.fetch_timeout + WAIT_SLACK
        },
        Duration::from_secs,
    );
    let outcome = follow(ctx, &orchestrator, &record, timeout).await;
    // Leave unfinished work as-is for `vidgate resume`.
    orchestrator.shutdown().await;

    let finished = outcome?;
    ctx.emit(&render::render_record("generate", &finished, ctx.render)?);
    if finished.status == GenerationStatus::Failed {
        return Err(GateError::GenerationFailed {
            id: finished.id.clone(),
            kind: finished.error_kind.unwrap_or(FailureKind::ProviderFailed),
            message: finished.error.clone().unwrap_or_default(),
        });
    }
    Ok(())
}

/// Wait until the record leaves `queued`, so the provider owns the job
/// before the process exits.
async fn until_submitted(
    orchestrator: &Orchestrator,
    id: &str,
    timeout: Duration,
) -> Result<GenerationRecord> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let record = orchestrator.get(id)?;
        if record.status != GenerationStatus::Queued {
            return Ok(record);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(GateError::WaitTimeout {
                id: id.to_string(),
                status: record.status.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        tokio::time::sleep(SUBMIT_CHECK).await;
    }
}

/// Wait for a terminal record, echoing progress and honoring Ctrl-C.
async fn follow(
    ctx: &CommandContext,
    orchestrator: &Orchestrator,
    record: &GenerationRecord,
    timeout: Duration,
) -> Result<GenerationRecord> {
    let show_progress = ctx.render.format == OutputFormat::Human;
    let mut updates = orchestrator.subscribe();
    let mut last = (record.status, record.progress);
    let mut updates_open = true;

    if show_progress {
        eprintln!("{}", human::status_line(record, ctx.render.no_color));
    }

    let wait = orchestrator.wait(&record.id, timeout);
    tokio::pin!(wait);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut wait => return result,
            _ = &mut ctrl_c => {
                tracing::info!(generation_id = %record.id, "interrupted; cancelling");
                if show_progress {
                    eprintln!("cancelling {}", record.id);
                }
                return orchestrator.cancel(&record.id);
            }
            update = updates.recv(), if updates_open => match update {
                Ok(update) if update.id == record.id => {
                    let current = (update.status, update.progress);
                    if current != last && show_progress && !update.is_terminal() {
                        eprintln!("{}", human::status_line(&update, ctx.render.no_color));
                    }
                    last = current;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => updates_open = false,
            },
        }
    }
}
