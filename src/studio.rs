// src/studio.rs
//! Studio - one news-to-short production session.
//!
//! Thin facade over the controllers; it owns the current production run so
//! callers can wait for it or have it cancelled by a restart.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::config::StudioConfig;
use crate::error::{StudioError, StudioResult};
use crate::export::{Bundle, BundleAssembler};
use crate::gateway::{ArtifactFetcher, ConfiguredCredentials, CredentialProbe, GeminiGateway, GenerationGateway};
use crate::models::{
    sniff_image_mime, BinaryRef, IdeationOption, NewsItem, ReferenceCandidate, ScriptPackage,
    WorkflowAggregate,
};
use crate::workflow::{
    ProductionReport, ProductionRun, ReferenceChoice, RegenerationController, StageController,
    StudioContext,
};

#[derive(Clone)]
pub struct Studio {
    ctx: Arc<StudioContext>,
    stages: StageController,
    regeneration: RegenerationController,
    production: Arc<Mutex<Option<ProductionRun>>>,
}

impl Studio {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        fetcher: Arc<dyn ArtifactFetcher>,
        credentials: Arc<dyn CredentialProbe>,
        config: StudioConfig,
    ) -> Self {
        let ctx = Arc::new(StudioContext::new(gateway, fetcher, credentials, config));
        Self {
            stages: StageController::new(Arc::clone(&ctx)),
            regeneration: RegenerationController::new(Arc::clone(&ctx)),
            production: Arc::new(Mutex::new(None)),
            ctx,
        }
    }

    /// Studio backed by the Gemini API.
    pub fn from_config(config: StudioConfig) -> Self {
        let gemini = Arc::new(GeminiGateway::new(&config));
        let credentials = Arc::new(ConfiguredCredentials::from_config(&config));
        Self::new(gemini.clone(), gemini, credentials, config)
    }

    pub fn config(&self) -> &StudioConfig {
        &self.ctx.config
    }

    pub fn snapshot(&self) -> WorkflowAggregate {
        self.ctx.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowAggregate> {
        self.ctx.store.subscribe()
    }

    // ---- stage transitions ----

    pub async fn enter_news(&self) -> StudioResult<Vec<NewsItem>> {
        self.stages.enter_news().await
    }

    pub async fn select_news(&self, news_id: &str) -> StudioResult<Vec<IdeationOption>> {
        self.stages.select_news(news_id).await
    }

    pub async fn select_idea(&self, idea_id: &str) -> StudioResult<ScriptPackage> {
        self.stages.select_idea(idea_id).await
    }

    pub async fn request_reference_variants(&self) -> StudioResult<Vec<ReferenceCandidate>> {
        self.stages.request_reference_variants().await
    }

    pub fn upload_reference(&self, image: BinaryRef) -> StudioResult<String> {
        self.stages.upload_reference(image)
    }

    /// Upload raw image bytes; the type is detected from the file signature.
    pub fn upload_reference_bytes(&self, bytes: Vec<u8>) -> StudioResult<String> {
        let mime = sniff_image_mime(&bytes).ok_or_else(|| {
            StudioError::PreconditionError("reference upload is not a PNG, JPEG or WebP image".to_string())
        })?;
        self.stages.upload_reference(BinaryRef::inline(mime, bytes))
    }

    /// Enter Production and start generating in the background.
    pub fn select_reference(&self, choice: ReferenceChoice) -> StudioResult<()> {
        let run = self.stages.select_reference(choice)?;
        *self.production.lock().unwrap_or_else(|p| p.into_inner()) = Some(run);
        Ok(())
    }

    /// Wait for the current production run, if any, to settle.
    pub async fn wait_for_production(&self) -> StudioResult<Option<ProductionReport>> {
        let run = self.production.lock().unwrap_or_else(|p| p.into_inner()).take();
        match run {
            Some(run) => run.wait().await.map(Some),
            None => Ok(None),
        }
    }

    pub fn restart(&self) {
        if let Some(run) = self.production.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            run.cancel();
        }
        self.stages.restart();
    }

    // ---- regeneration ----

    pub async fn regenerate_scene(&self, segment_id: &str) -> StudioResult<()> {
        self.regeneration.regenerate_scene(segment_id).await
    }

    pub async fn regenerate_thumbnail(&self) -> StudioResult<()> {
        self.regeneration.regenerate_thumbnail().await
    }

    pub async fn regenerate_narration(&self) -> StudioResult<()> {
        self.regeneration.regenerate_narration().await
    }

    pub async fn regenerate_reference_variant(&self, candidate_id: &str) -> StudioResult<()> {
        self.regeneration.regenerate_reference_variant(candidate_id).await
    }

    pub async fn animate_scene(&self, segment_id: &str) -> StudioResult<()> {
        self.regeneration.animate_scene(segment_id).await
    }

    // ---- export ----

    pub async fn build_bundle(&self) -> StudioResult<Bundle> {
        let package = self
            .snapshot()
            .script_package
            .ok_or_else(|| StudioError::PreconditionError("there is no script to export".to_string()))?;
        BundleAssembler::new(Arc::clone(&self.ctx.fetcher))
            .build_bundle(&package)
            .await
    }

    /// Build the bundle and write it into the configured output directory.
    pub async fn export_bundle(&self) -> StudioResult<PathBuf> {
        let bundle = self.build_bundle().await?;
        bundle.write_to(&self.ctx.config.output_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{studio_at_reference_selection, test_studio, MemoryFetcher, ScriptedGateway};
    use crate::models::Stage;

    #[tokio::test]
    async fn test_full_walkthrough_reaches_a_complete_bundle() {
        let gateway = ScriptedGateway::new();
        let studio = test_studio(gateway.clone(), MemoryFetcher::new());
        let mut updates = studio.subscribe();

        let news = studio.enter_news().await.unwrap();
        let ideas = studio.select_news(&news[0].id).await.unwrap();
        let package = studio.select_idea(&ideas[0].id).await.unwrap();
        assert_eq!(package.segments.len(), 10);
        let candidates = studio.request_reference_variants().await.unwrap();
        assert_eq!(candidates.len(), 4);

        studio
            .select_reference(ReferenceChoice::Candidate(candidates[1].id.clone()))
            .unwrap();
        let report = studio.wait_for_production().await.unwrap().unwrap();
        assert_eq!(report.scenes_succeeded(), 10);

        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert_eq!(latest.stage, Stage::Production);
        assert!(latest.is_consistent());
        assert!(latest.script_package.unwrap().production_settled());

        let bundle = studio.build_bundle().await.unwrap();
        assert_eq!(bundle.manifest.artifacts.len(), 12);
    }

    #[tokio::test]
    async fn test_every_observed_snapshot_is_consistent() {
        let gateway = ScriptedGateway::new();
        let studio = test_studio(gateway, MemoryFetcher::new());
        let mut rx = studio.subscribe();

        let watcher = tokio::spawn(async move {
            let mut seen = 0;
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                assert!(snapshot.is_consistent(), "inconsistent at version {}", snapshot.version);
                seen += 1;
            }
            seen
        });

        let news = studio.enter_news().await.unwrap();
        let ideas = studio.select_news(&news[0].id).await.unwrap();
        studio.select_idea(&ideas[0].id).await.unwrap();
        let candidates = studio.request_reference_variants().await.unwrap();
        studio
            .select_reference(ReferenceChoice::Candidate(candidates[0].id.clone()))
            .unwrap();
        studio.wait_for_production().await.unwrap();
        studio.restart();

        drop(studio);
        assert!(watcher.await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_upload_bytes_are_sniffed() {
        let studio = studio_at_reference_selection(ScriptedGateway::new(), MemoryFetcher::new()).await;
        assert!(matches!(
            studio.upload_reference_bytes(b"plain text".to_vec()),
            Err(StudioError::PreconditionError(_))
        ));

        let id = studio
            .upload_reference_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00])
            .unwrap();
        let snapshot = studio.snapshot();
        let candidate = snapshot.reference_candidate(&id).unwrap();
        assert_eq!(candidate.image.value().map(|i| i.mime_type()), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_export_without_script_is_precondition_error() {
        let studio = test_studio(ScriptedGateway::new(), MemoryFetcher::new());
        assert!(matches!(
            studio.build_bundle().await,
            Err(StudioError::PreconditionError(_))
        ));
    }

    #[tokio::test]
    async fn test_export_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = ScriptedGateway::new();
        let mut config = crate::gateway::mock::test_config();
        config.output_dir = dir.path().to_path_buf();
        let studio = Studio::new(
            gateway,
            MemoryFetcher::new(),
            Arc::new(ConfiguredCredentials { api_key_present: true, motion_enabled: true }),
            config,
        );
        let news = studio.enter_news().await.unwrap();
        let ideas = studio.select_news(&news[0].id).await.unwrap();
        studio.select_idea(&ideas[0].id).await.unwrap();

        // A script alone is already exportable as a metadata-only bundle.
        let path = studio.export_bundle().await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
    }
}
