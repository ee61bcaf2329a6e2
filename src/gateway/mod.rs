// src/gateway/mod.rs
//! Boundary to the external generative-content service.
//!
//! The production core only talks to these traits. `GeminiGateway` backs them
//! with HTTP; tests back them with a scripted in-memory double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StudioError;
use crate::models::BinaryRef;

pub mod gemini;
pub mod schema;
pub mod wav;

#[cfg(test)]
pub mod mock;

pub use gemini::GeminiGateway;

/// News item as returned by the service, before validation and id assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewsDraft {
    pub title: String,
    pub snippet: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdeaDraft {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentDraft {
    pub time_offset: String,
    pub narration_text: String,
    pub image_prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptDraft {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub call_to_action: String,
    pub thumbnail_prompt: String,
    pub main_reference_prompt: String,
    pub full_narration_text: String,
    pub segments: Vec<SegmentDraft>,
}

/// Handle to a long-running motion generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionJob {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionStatus {
    Running,
    Completed(BinaryRef),
    Failed(String),
}

/// One async operation per artifact kind. Every call may be slow or fail.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn fetch_news(&self) -> Result<Vec<NewsDraft>, StudioError>;

    async fn generate_ideas(&self, title: &str, snippet: &str) -> Result<Vec<IdeaDraft>, StudioError>;

    async fn generate_script(
        &self,
        idea_title: &str,
        idea_description: &str,
    ) -> Result<ScriptDraft, StudioError>;

    async fn generate_reference_variants(&self, prompt: &str) -> Result<Vec<BinaryRef>, StudioError>;

    /// A single replacement variant. Defaults to the first of a fresh batch.
    async fn generate_reference_variant(&self, prompt: &str) -> Result<BinaryRef, StudioError> {
        self.generate_reference_variants(prompt)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::MissingArtifact("reference variant".to_string()))
    }

    async fn generate_thumbnail(&self, prompt: &str) -> Result<BinaryRef, StudioError>;

    async fn generate_narration(&self, full_narration_text: &str) -> Result<BinaryRef, StudioError>;

    async fn generate_scene_image(
        &self,
        reference: &BinaryRef,
        prompt: &str,
    ) -> Result<BinaryRef, StudioError>;

    async fn start_scene_motion(
        &self,
        scene_image: &BinaryRef,
        prompt: &str,
    ) -> Result<MotionJob, StudioError>;

    async fn poll_scene_motion(&self, job: &MotionJob) -> Result<MotionStatus, StudioError>;
}

/// Resolves remote artifacts into bytes at export time.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch_remote(&self, uri: &str) -> Result<Vec<u8>, StudioError>;
}

/// Confirms the environment is entitled to run motion generation.
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    async fn ensure_motion_access(&self) -> Result<(), StudioError>;
}

/// Probe backed by static configuration: a key must exist and the caller must
/// have confirmed billing readiness.
#[derive(Debug, Clone)]
pub struct ConfiguredCredentials {
    pub api_key_present: bool,
    pub motion_enabled: bool,
}

impl ConfiguredCredentials {
    pub fn from_config(config: &crate::config::StudioConfig) -> Self {
        Self {
            api_key_present: config.api_key.is_some(),
            motion_enabled: config.motion_enabled,
        }
    }
}

#[async_trait]
impl CredentialProbe for ConfiguredCredentials {
    async fn ensure_motion_access(&self) -> Result<(), StudioError> {
        if !self.api_key_present {
            return Err(StudioError::CredentialRequired(
                "no API key is configured".to_string(),
            ));
        }
        if !self.motion_enabled {
            return Err(StudioError::CredentialRequired(
                "motion generation needs a billing-enabled key (set STUDIO_MOTION_ENABLED=true)".to_string(),
            ));
        }
        Ok(())
    }
}
