//! Shared state for command handlers.

use std::sync::Arc;

use crate::core::http;
use crate::core::orchestrator::Orchestrator;
use crate::core::pricing::PricingTable;
use crate::core::provider::{Provider, ProviderRegistry};
use crate::error::Result;
use crate::render::RenderOptions;
use crate::storage::blobs::FsBlobStore;
use crate::storage::config::ResolvedConfig;
use crate::storage::credentials::{Credential, CredentialStore, SystemCredentialStore};
use crate::storage::records::SqliteRecordStore;

/// Resolved configuration plus the stores commands work against.
pub struct CommandContext {
    pub config: ResolvedConfig,
    pub render: RenderOptions,
    credentials: Arc<dyn CredentialStore>,
}

impl CommandContext {
    #[must_use]
    pub fn new(config: ResolvedConfig) -> Self {
        Self::with_credentials(config, Arc::new(SystemCredentialStore::default()))
    }

    #[must_use]
    pub fn with_credentials(config: ResolvedConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let render = RenderOptions {
            format: config.format,
            pretty: config.pretty,
            no_color: !crate::util::env::should_use_color(config.no_color),
        };
        Self {
            config,
            render,
            credentials,
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    /// Credential lookup that treats store errors as "not configured".
    #[must_use]
    pub fn try_credential(&self, key_ref: &str) -> Option<Credential> {
        match self.credentials.credential(key_ref) {
            Ok(credential) => credential,
            Err(e) => {
                tracing::debug!(key_ref, error = %e, "credential lookup failed");
                None
            }
        }
    }

    /// Key ref for `provider`, or the explicit override.
    #[must_use]
    pub fn key_ref_for(&self, provider: Provider, explicit: Option<&str>) -> String {
        explicit.map_or_else(|| self.config.key_ref(provider), str::to_string)
    }

    /// Open the record database and video directory and wire adapters.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let client = http::build_client()?;
        let registry = ProviderRegistry::from_config(&self.config, &client);
        let records = SqliteRecordStore::open(&self.config.paths.records_db_file())?;
        let blobs = FsBlobStore::new(self.config.videos_dir.clone());
        tracing::debug!(
            db = %self.config.paths.records_db_file().display(),
            videos = %self.config.videos_dir.display(),
            providers = ?registry.providers(),
            "opening generation store"
        );

        Ok(Orchestrator::builder(
            registry,
            Arc::new(records),
            Arc::new(blobs),
            Arc::clone(&self.credentials),
        )
        .pricing(PricingTable::current())
        .policy(self.config.poll_policy())
        .build())
    }

    /// Print rendered output with exactly one trailing newline.
    pub fn emit(&self, rendered: &str) {
        println!("{}", rendered.trim_end_matches('\n'));
    }
}
