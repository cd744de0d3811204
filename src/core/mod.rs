//! Domain model, provider routing, pricing, and the generation lifecycle.

pub mod http;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod poller;
pub mod pricing;
pub mod provider;
pub mod stats;

pub use models::{
    CanonicalStatus, ContentMetadata, FailureKind, FetchedContent, GenerationRecord,
    GenerationSpec, GenerationStatus, PollReport, RecordFilter, Resolution, Transition,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, ResumeReport};
pub use poller::{PollOutcome, PollPolicy, StatusPoller};
pub use pricing::{CostEstimate, ModelRate, PriceEntry, PricingTable};
pub use provider::{Provider, ProviderRegistry};
pub use stats::{Breakdown, UsageStats};
