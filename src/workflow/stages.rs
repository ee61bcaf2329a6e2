// src/workflow/stages.rs
//! StageController - guarded forward transitions News -> ... -> Production.
//!
//! A transition commits only after its gateway call resolved and validated.
//! Failures leave the stage and every published field as they were.

use std::sync::Arc;
use uuid::Uuid;

use super::production::{ProductionRun, SegmentOrchestrator};
use super::state::WorkflowUpdate;
use super::{ReferenceChoice, StudioContext};
use crate::error::{StudioError, StudioResult};
use crate::gateway::schema;
use crate::models::{
    BinaryRef, IdeationOption, NewsItem, ReferenceCandidate, ReferenceOrigin, ScriptPackage,
    SelectedReference, Stage, TaskState, WorkflowAggregate,
};

fn require_stage(snapshot: &WorkflowAggregate, allowed: &[Stage], action: &str) -> StudioResult<()> {
    if allowed.contains(&snapshot.stage) {
        return Ok(());
    }
    Err(StudioError::PreconditionError(format!(
        "cannot {} during the {} stage",
        action,
        snapshot.stage.label()
    )))
}

#[derive(Clone)]
pub struct StageController {
    ctx: Arc<StudioContext>,
}

impl StageController {
    pub fn new(ctx: Arc<StudioContext>) -> Self {
        Self { ctx }
    }

    /// Fetch trending news. The previous candidate list survives a failure.
    pub async fn enter_news(&self) -> StudioResult<Vec<NewsItem>> {
        let snapshot = self.ctx.store.snapshot();
        require_stage(&snapshot, &[Stage::News], "fetch news")?;

        let items = schema::validate_news(self.ctx.gateway.fetch_news().await?)?;
        self.ctx.commit(
            snapshot.session,
            WorkflowUpdate::NewsFetched {
                session: snapshot.session,
                items: items.clone(),
            },
            "news fetch",
        )?;

        tracing::info!("📰 {} news candidates", items.len());
        Ok(items)
    }

    pub async fn select_news(&self, news_id: &str) -> StudioResult<Vec<IdeationOption>> {
        let snapshot = self.ctx.store.snapshot();
        require_stage(&snapshot, &[Stage::News], "select news")?;
        let item = snapshot
            .news_candidates
            .iter()
            .find(|n| n.id == news_id)
            .cloned()
            .ok_or_else(|| StudioError::PreconditionError(format!("unknown news item {}", news_id)))?;
        let session = snapshot.session;

        self.ctx.commit(
            session,
            WorkflowUpdate::NewsSelected {
                session,
                item: item.clone(),
            },
            "news selection",
        )?;
        tracing::info!("📌 Selected news: {}", item.title);

        let drafts = self.ctx.gateway.generate_ideas(&item.title, &item.snippet).await?;
        let options = schema::validate_ideas(drafts)?;
        self.ctx.commit(
            session,
            WorkflowUpdate::IdeationReady {
                session,
                news_id: item.id.clone(),
                options: options.clone(),
            },
            "ideation",
        )?;

        tracing::info!("💡 Stage -> {}", Stage::Ideation.label());
        Ok(options)
    }

    pub async fn select_idea(&self, idea_id: &str) -> StudioResult<ScriptPackage> {
        let snapshot = self.ctx.store.snapshot();
        require_stage(&snapshot, &[Stage::Ideation], "select an idea")?;
        let idea = snapshot
            .ideation_options
            .iter()
            .find(|i| i.id == idea_id)
            .cloned()
            .ok_or_else(|| StudioError::PreconditionError(format!("unknown idea {}", idea_id)))?;
        let session = snapshot.session;

        self.ctx.commit(
            session,
            WorkflowUpdate::IdeaSelected {
                session,
                idea: idea.clone(),
            },
            "idea selection",
        )?;
        tracing::info!("📌 Selected idea: {}", idea.title);

        let draft = self
            .ctx
            .gateway
            .generate_script(&idea.title, &idea.description)
            .await?;
        let package = schema::normalize_script(draft)?;
        self.ctx.commit(
            session,
            WorkflowUpdate::ScriptReady {
                session,
                idea_id: idea.id.clone(),
                package: package.clone(),
            },
            "script",
        )?;

        tracing::info!("📝 Stage -> {} ('{}')", Stage::Script.label(), package.title);
        Ok(package)
    }

    /// Generate a fresh set of style references from the script's reference prompt.
    pub async fn request_reference_variants(&self) -> StudioResult<Vec<ReferenceCandidate>> {
        let snapshot = self.ctx.store.snapshot();
        require_stage(
            &snapshot,
            &[Stage::Script, Stage::ReferenceSelection],
            "generate reference variants",
        )?;
        let prompt = snapshot
            .script_package
            .as_ref()
            .map(|p| p.main_reference_prompt.clone())
            .ok_or_else(|| StudioError::PreconditionError("no script to derive references from".to_string()))?;

        let images = self.ctx.gateway.generate_reference_variants(&prompt).await?;
        let candidates = schema::validate_reference_variants(images)?;
        self.ctx.commit(
            snapshot.session,
            WorkflowUpdate::ReferenceVariantsReady {
                session: snapshot.session,
                candidates: candidates.clone(),
            },
            "reference variants",
        )?;

        tracing::info!("🎨 Stage -> {}", Stage::ReferenceSelection.label());
        Ok(candidates)
    }

    /// Add a user-supplied reference image as a candidate; returns its id.
    pub fn upload_reference(&self, image: BinaryRef) -> StudioResult<String> {
        let snapshot = self.ctx.store.snapshot();
        require_stage(&snapshot, &[Stage::ReferenceSelection], "upload a reference")?;
        if !image.is_image() {
            return Err(StudioError::PreconditionError(format!(
                "reference uploads must be images, got {}",
                image.mime_type()
            )));
        }

        let candidate = ReferenceCandidate {
            id: Uuid::new_v4().to_string(),
            image: TaskState::Success(image),
            origin: ReferenceOrigin::Uploaded,
        };
        let id = candidate.id.clone();
        self.ctx.commit(
            snapshot.session,
            WorkflowUpdate::ReferenceUploaded {
                session: snapshot.session,
                candidate,
            },
            "reference upload",
        )?;

        tracing::info!("📤 Uploaded reference {}", id);
        Ok(id)
    }

    /// The only way into Production. Starts the SegmentOrchestrator.
    pub fn select_reference(&self, choice: ReferenceChoice) -> StudioResult<ProductionRun> {
        let candidate_id = match choice {
            ReferenceChoice::Candidate(id) => id,
            ReferenceChoice::Upload(image) => self.upload_reference(image)?,
        };

        let snapshot = self.ctx.store.snapshot();
        require_stage(&snapshot, &[Stage::ReferenceSelection], "select a reference")?;
        let candidate = snapshot
            .reference_candidate(&candidate_id)
            .ok_or_else(|| StudioError::PreconditionError(format!("unknown reference {}", candidate_id)))?;
        let image = candidate.image.value().cloned().ok_or_else(|| {
            StudioError::PreconditionError(format!("reference {} has no finished image", candidate_id))
        })?;

        self.ctx.commit(
            snapshot.session,
            WorkflowUpdate::ReferenceSelected {
                session: snapshot.session,
                reference: SelectedReference {
                    candidate_id: candidate.id.clone(),
                    image,
                    origin: candidate.origin,
                },
            },
            "reference selection",
        )?;

        tracing::info!("🎯 Stage -> {}", Stage::Production.label());
        SegmentOrchestrator::new(Arc::clone(&self.ctx)).start()
    }

    /// Back to News. In-flight work of the old session is cancelled and its
    /// late results are dropped; news candidates are kept.
    pub fn restart(&self) {
        self.ctx.store.dispatch(WorkflowUpdate::Restart);
        self.ctx.renew_session_token();
        tracing::info!("🔄 Workflow restarted (session {})", self.ctx.store.snapshot().session);
    }
}
