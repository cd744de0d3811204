//! `vidgate providers` and `vidgate pricing`.

use crate::cli::context::CommandContext;
use crate::core::http;
use crate::core::pricing::PricingTable;
use crate::core::provider::{Provider, ProviderRegistry};
use crate::error::Result;
use crate::render::{self, ProviderSummary};

/// One summary per provider, enabled or not.
pub fn provider_summaries(ctx: &CommandContext) -> Result<Vec<ProviderSummary>> {
    let registry = ProviderRegistry::from_config(&ctx.config, &http::build_client()?);

    Ok(Provider::ALL
        .iter()
        .map(|&provider| {
            let settings = ctx.config.provider(provider);
            let adapter = registry.get(provider);
            let key_ref = settings.key_ref_or_default(provider);
            ProviderSummary {
                provider,
                display_name: provider.display_name(),
                enabled: adapter.is_some(),
                api_base: settings.api_base_or_default(provider),
                models: provider.models().to_vec(),
                features: adapter.as_ref().map(|a| a.features()),
                content_auth: adapter.as_ref().map(|a| a.content_auth()),
                key_configured: ctx.try_credential(&key_ref).is_some(),
                key_ref,
            }
        })
        .collect())
}

pub fn providers(ctx: &CommandContext) -> Result<()> {
    let rows = provider_summaries(ctx)?;
    ctx.emit(&render::render_providers(&rows, ctx.render)?);
    Ok(())
}

pub fn pricing(ctx: &CommandContext) -> Result<()> {
    let entries = PricingTable::current().entries();
    ctx.emit(&render::render_pricing(&entries, ctx.render)?);
    Ok(())
}
