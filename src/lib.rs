// lib.rs - news-to-short production orchestrator
pub mod config;
pub mod error;
pub mod export;
pub mod gateway;
pub mod models;
pub mod studio;
pub mod workflow;

// Re-export commonly used types for convenience
pub use config::StudioConfig;
pub use error::{StudioError, StudioResult};
pub use export::{Bundle, BundleAssembler, BundleManifest};
pub use gateway::{ArtifactFetcher, CredentialProbe, GeminiGateway, GenerationGateway};
pub use models::{
    BinaryRef, IdeationOption, NewsItem, ReferenceCandidate, ScriptPackage, Segment, Stage, TaskState,
    TaskStatus, WorkflowAggregate,
};
pub use studio::Studio;
pub use workflow::{ProductionReport, ReferenceChoice, TaskOutcome};
