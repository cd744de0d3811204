//! Provider API keys.
//!
//! Keys are looked up by a *key ref* (an opaque name such as `openai` or
//! `team-b.runway`). [`SystemCredentialStore`] checks `VIDGATE_KEY_<REF>` in
//! the environment first, then the OS keyring. Callers fetch a credential for
//! every provider call and drop it right after.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::suggestions::env_var_for_key_ref;
use crate::error::{GateError, Result};

/// Keyring service name for stored provider keys.
pub const KEYRING_SERVICE: &str = "vidgate";

/// Where a credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Keyring,
    Memory,
}

impl CredentialSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "env",
            Self::Keyring => "keyring",
            Self::Memory => "memory",
        }
    }
}

/// A decrypted provider API key.
///
/// `Debug` never prints the secret; use [`Credential::fingerprint`] in logs.
#[derive(Clone)]
pub struct Credential {
    secret: String,
    source: CredentialSource,
}

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            secret: secret.into().trim().to_string(),
            source,
        }
    }

    /// Raw key, for building request headers only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret)
    }

    #[must_use]
    pub const fn source(&self) -> CredentialSource {
        self.source
    }

    /// First 8 bytes of the SHA-256 of the key, hex encoded.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.secret.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint())
            .field("source", &self.source)
            .finish()
    }
}

/// Lookup of credentials by key ref.
pub trait CredentialStore: Send + Sync {
    /// The credential stored under `key_ref`, if any.
    fn credential(&self, key_ref: &str) -> Result<Option<Credential>>;

    /// Store or replace the secret for `key_ref`.
    fn store(&self, key_ref: &str, secret: &str) -> Result<()>;

    /// Remove `key_ref`. Returns whether anything was removed.
    fn delete(&self, key_ref: &str) -> Result<bool>;
}

// =============================================================================
// System store
// =============================================================================

/// Environment + OS keyring.
#[derive(Debug, Clone)]
pub struct SystemCredentialStore {
    service: String,
}

impl Default for SystemCredentialStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl SystemCredentialStore {
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key_ref: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key_ref)
            .map_err(|e| GateError::CredentialStore(format!("keyring entry for '{key_ref}': {e}")))
    }
}

impl CredentialStore for SystemCredentialStore {
    fn credential(&self, key_ref: &str) -> Result<Option<Credential>> {
        let from_env = std::env::var(env_var_for_key_ref(key_ref))
            .ok()
            .filter(|v| !v.trim().is_empty());
        if let Some(value) = from_env {
            return Ok(Some(Credential::new(value, CredentialSource::Environment)));
        }

        match self.entry(key_ref)?.get_password() {
            Ok(secret) => Ok(Some(Credential::new(secret, CredentialSource::Keyring))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                tracing::debug!(key_ref, error = %e, "keyring lookup failed");
                Err(GateError::CredentialStore(e.to_string()))
            }
        }
    }

    fn store(&self, key_ref: &str, secret: &str) -> Result<()> {
        self.entry(key_ref)?
            .set_password(secret.trim())
            .map_err(|e| GateError::CredentialStore(format!("failed to store key: {e}")))
    }

    fn delete(&self, key_ref: &str) -> Result<bool> {
        match self.entry(key_ref)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(GateError::CredentialStore(format!("failed to delete key: {e}"))),
        }
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local credentials, counting lookups.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<String, String>>,
    lookups: AtomicUsize,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with_key(self, key_ref: &str, secret: &str) -> Self {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(key_ref.to_string(), secret.to_string());
        }
        self
    }

    /// Number of `credential` calls so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn poisoned() -> GateError {
        GateError::CredentialStore("credential map lock poisoned".to_string())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn credential(&self, key_ref: &str) -> Result<Option<Credential>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let keys = self.keys.read().map_err(|_| Self::poisoned())?;
        Ok(keys
            .get(key_ref)
            .map(|secret| Credential::new(secret.clone(), CredentialSource::Memory)))
    }

    fn store(&self, key_ref: &str, secret: &str) -> Result<()> {
        let mut keys = self.keys.write().map_err(|_| Self::poisoned())?;
        keys.insert(key_ref.to_string(), secret.trim().to_string());
        Ok(())
    }

    fn delete(&self, key_ref: &str) -> Result<bool> {
        let mut keys = self.keys.write().map_err(|_| Self::poisoned())?;
        Ok(keys.remove(key_ref).is_some())
    }
}
