//! Storage for configuration, credentials, generation records, and videos.

pub mod blobs;
pub mod config;
pub mod credentials;
pub mod paths;
pub mod records;
pub mod schema;

pub use blobs::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::{Config, ConfigSource, ConfigSources, ProviderSettings, ResolvedConfig};
pub use credentials::{
    Credential, CredentialSource, CredentialStore, MemoryCredentialStore, SystemCredentialStore,
};
pub use paths::AppPaths;
pub use records::{MemoryRecordStore, RecordStore, SqliteRecordStore, UpdateOutcome};
