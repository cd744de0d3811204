//! Commands over stored generations: `get`, `list`, `cancel`, `delete`,
//! `resume`, and `stats`.

use std::time::Duration;

use crate::cli::args::{IdArgs, ListArgs, ResumeArgs};
use crate::cli::context::CommandContext;
use crate::core::models::RecordFilter;
use crate::error::Result;
use crate::render;

pub fn get(ctx: &CommandContext, args: &IdArgs) -> Result<()> {
    let record = ctx.orchestrator()?.get(&args.id)?;
    ctx.emit(&render::render_record("get", &record, ctx.render)?);
    Ok(())
}

pub fn list(ctx: &CommandContext, args: &ListArgs) -> Result<()> {
    let filter = RecordFilter {
        provider: args.provider_filter()?,
        status: args.status_filter()?,
        offset: args.offset,
        limit: Some(args.limit),
    };
    let records = ctx.orchestrator()?.list(&filter)?;
    ctx.emit(&render::render_records(&records, ctx.render)?);
    Ok(())
}

pub fn cancel(ctx: &CommandContext, args: &IdArgs) -> Result<()> {
    let record = ctx.orchestrator()?.cancel(&args.id)?;
    ctx.emit(&render::render_record("cancel", &record, ctx.render)?);
    Ok(())
}

pub async fn delete(ctx: &CommandContext, args: &IdArgs) -> Result<()> {
    let record = ctx.orchestrator()?.delete(&args.id).await?;
    ctx.emit(&render::render_record("delete", &record, ctx.render)?);
    Ok(())
}

/// Resume interrupted work; with `--wait`, stay until it all finishes.
pub async fn resume(ctx: &CommandContext, args: &ResumeArgs) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let report = orchestrator.resume_pending()?;
    ctx.emit(&render::render_resume(&report, ctx.render)?);

    if args.wait {
        let policy = orchestrator.policy();
        let limit = policy.max_wait() + policy.fetch_timeout + Duration::from_secs(30);
        for id in &report.resumed {
            match orchestrator.wait(id, limit).await {
                Ok(record) => {
                    tracing::info!(generation_id = %id, status = %record.status, "resumed generation finished");
                    ctx.emit(&render::render_record("resume", &record, ctx.render)?);
                }
                Err(e) => tracing::warn!(generation_id = %id, error = %e, "stopped waiting"),
            }
        }
    }
    orchestrator.shutdown().await;
    Ok(())
}

pub fn stats(ctx: &CommandContext) -> Result<()> {
    let stats = ctx.orchestrator()?.stats()?;
    ctx.emit(&render::render_stats(&stats, ctx.render)?);
    Ok(())
}
