//! `vidgate keys`: store, check, and remove provider API keys.

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::cli::args::KeysCommand;
use crate::cli::context::CommandContext;
use crate::core::provider::Provider;
use crate::error::{GateError, Result};
use crate::render::{self, KeyAction, KeySummary};
use crate::storage::credentials::{Credential, CredentialSource};

pub async fn execute(ctx: &CommandContext, command: &KeysCommand) -> Result<()> {
    match command {
        KeysCommand::Set {
            provider,
            key_ref,
            secret,
            skip_validation,
        } => set(ctx, provider, key_ref.as_deref(), secret.as_deref(), *skip_validation).await,
        KeysCommand::Validate { provider, key_ref } => {
            validate(ctx, provider, key_ref.as_deref()).await
        }
        KeysCommand::Delete { key_ref } => delete(ctx, key_ref),
        KeysCommand::List => list(ctx),
    }
}

fn read_secret(explicit: Option<&str>) -> Result<String> {
    let secret = match explicit {
        Some(secret) => secret.to_string(),
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };
    let secret = secret.trim().to_string();
    if secret.is_empty() {
        return Err(GateError::Config("empty API key".to_string()));
    }
    Ok(secret)
}

async fn set(
    ctx: &CommandContext,
    provider: &str,
    key_ref: Option<&str>,
    secret: Option<&str>,
    skip_validation: bool,
) -> Result<()> {
    let provider = Provider::from_cli_name(provider)?;
    let key_ref = ctx.key_ref_for(provider, key_ref);
    let credential = Credential::new(read_secret(secret)?, CredentialSource::Memory);

    let valid = if skip_validation {
        None
    } else {
        let valid = ctx
            .orchestrator()?
            .validate_credential(provider, &credential)
            .await?;
        if !valid {
            return Err(GateError::AuthInvalid {
                provider: provider.cli_name().to_string(),
                reason: "key was rejected; nothing stored".to_string(),
            });
        }
        Some(true)
    };

    ctx.credentials().store(&key_ref, credential.expose())?;
    tracing::info!(%provider, key_ref, fingerprint = %credential.fingerprint(), "stored API key");

    let action = KeyAction {
        action: "set",
        key_ref,
        provider: Some(provider),
        valid,
        stored: true,
        fingerprint: Some(credential.fingerprint()),
    };
    ctx.emit(&render::render_key_action(&action, ctx.render)?);
    Ok(())
}

async fn validate(ctx: &CommandContext, provider: &str, key_ref: Option<&str>) -> Result<()> {
    let provider = Provider::from_cli_name(provider)?;
    let key_ref = ctx.key_ref_for(provider, key_ref);
    let credential = ctx
        .credentials()
        .credential(&key_ref)?
        .ok_or_else(|| GateError::AuthNotConfigured {
            provider: provider.cli_name().to_string(),
            key_ref: key_ref.clone(),
        })?;

    let valid = ctx
        .orchestrator()?
        .validate_credential(provider, &credential)
        .await?;
    let action = KeyAction {
        action: "validate",
        key_ref: key_ref.clone(),
        provider: Some(provider),
        valid: Some(valid),
        stored: true,
        fingerprint: Some(credential.fingerprint()),
    };
    ctx.emit(&render::render_key_action(&action, ctx.render)?);

    if valid {
        Ok(())
    } else {
        Err(GateError::AuthInvalid {
            provider: provider.cli_name().to_string(),
            reason: format!("credential '{key_ref}' was rejected"),
        })
    }
}

fn delete(ctx: &CommandContext, key_ref: &str) -> Result<()> {
    let removed = ctx.credentials().delete(key_ref)?;
    if !removed {
        tracing::info!(key_ref, "no stored key to delete");
    }
    let action = KeyAction {
        action: "delete",
        key_ref: key_ref.to_string(),
        provider: None,
        valid: None,
        stored: false,
        fingerprint: None,
    };
    ctx.emit(&render::render_key_action(&action, ctx.render)?);
    Ok(())
}

/// Key refs referenced by provider settings, with the providers using each.
#[must_use]
pub fn key_summaries(ctx: &CommandContext) -> Vec<KeySummary> {
    let mut refs: BTreeMap<String, Vec<Provider>> = BTreeMap::new();
    for &provider in Provider::ALL {
        refs.entry(ctx.config.key_ref(provider)).or_default().push(provider);
    }

    refs.into_iter()
        .map(|(key_ref, providers)| {
            let credential = ctx.try_credential(&key_ref);
            KeySummary {
                configured: credential.is_some(),
                source: credential.as_ref().map(|c| c.source().as_str()),
                fingerprint: credential.as_ref().map(Credential::fingerprint),
                key_ref,
                providers,
            }
        })
        .collect()
}

fn list(ctx: &CommandContext) -> Result<()> {
    let rows = key_summaries(ctx);
    ctx.emit(&render::render_keys(&rows, ctx.render)?);
    Ok(())
}
