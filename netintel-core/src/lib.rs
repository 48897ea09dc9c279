pub mod config;
pub mod crypto;
pub mod error;
pub mod observability;
pub mod persistence;
pub mod providers;
pub mod query;
pub mod registry;
pub mod workflow;

pub use config::Config;
pub use crypto::{CryptoManager, EncryptedArtifact, KeyPair};
pub use error::{OrchestratorError, Result};
pub use persistence::FileSink;
pub use query::query_provider;
pub use registry::{build_registry, ProviderRegistry};
pub use workflow::{AnalyzeRequest, AnalysisReport, Orchestrator};
