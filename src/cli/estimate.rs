//! `vidgate estimate`: price a request without submitting it.

use crate::cli::args::SpecArgs;
use crate::cli::context::CommandContext;
use crate::core::pricing::PricingTable;
use crate::error::Result;
use crate::render;

pub fn execute(ctx: &CommandContext, args: &SpecArgs) -> Result<()> {
    let spec = args.to_spec()?;
    let estimate = PricingTable::current().estimate_spec(&spec)?;
    tracing::debug!(
        model = %estimate.model,
        provider = %estimate.provider,
        cost_usd = estimate.estimated_cost_usd,
        "estimated"
    );
    ctx.emit(&render::render_estimate(&estimate, ctx.render)?);
    Ok(())
}
