// src/workflow/regeneration.rs
//! RegenerationController - targeted re-runs of single Production artifacts.

use std::sync::Arc;

use super::production::{run_task, run_ticketed_task};
use super::state::TaskTarget;
use super::StudioContext;
use crate::error::{StudioError, StudioResult};
use crate::gateway::MotionStatus;
use crate::models::{BinaryRef, ReferenceOrigin, Stage, TaskState, Ticket, WorkflowAggregate};

#[derive(Clone)]
pub struct RegenerationController {
    ctx: Arc<StudioContext>,
}

impl RegenerationController {
    pub fn new(ctx: Arc<StudioContext>) -> Self {
        Self { ctx }
    }

    fn production_snapshot(&self, action: &str) -> StudioResult<WorkflowAggregate> {
        let snapshot = self.ctx.store.snapshot();
        if snapshot.stage != Stage::Production || snapshot.script_package.is_none() {
            return Err(StudioError::PreconditionError(format!(
                "cannot {} before production has started",
                action
            )));
        }
        Ok(snapshot)
    }

    /// Re-run one scene image. Clears that scene's motion before the call is
    /// issued; siblings, narration and thumbnail are untouched. A scene the
    /// production queue has not settled yet still belongs to the queue.
    pub async fn regenerate_scene(&self, segment_id: &str) -> StudioResult<()> {
        let snapshot = self.ctx.store.snapshot();
        let reference = snapshot
            .selected_reference
            .as_ref()
            .map(|r| r.image.clone())
            .ok_or_else(|| {
                StudioError::PreconditionError("select a reference before regenerating scenes".to_string())
            })?;
        let segment = snapshot
            .segment(segment_id)
            .ok_or_else(|| StudioError::PreconditionError(format!("unknown segment {}", segment_id)))?;
        if !segment.image.as_ref().map(TaskState::is_terminal).unwrap_or(false) {
            return Err(StudioError::PreconditionError(format!(
                "scene {} is still being generated",
                segment.index + 1
            )));
        }
        let prompt = segment.image_prompt.clone();

        tracing::info!("🔁 Regenerating scene {}", segment_id);
        run_task(
            &self.ctx,
            snapshot.session,
            &self.ctx.session_token(),
            TaskTarget::SceneImage(segment_id.to_string()),
            self.ctx.gateway.generate_scene_image(&reference, &prompt),
        )
        .await
        .into_result("scene regeneration")
    }

    pub async fn regenerate_thumbnail(&self) -> StudioResult<()> {
        let snapshot = self.production_snapshot("regenerate the thumbnail")?;
        let prompt = snapshot
            .script_package
            .as_ref()
            .map(|p| p.thumbnail_prompt.clone())
            .unwrap_or_default();

        tracing::info!("🔁 Regenerating thumbnail");
        run_task(
            &self.ctx,
            snapshot.session,
            &self.ctx.session_token(),
            TaskTarget::Thumbnail,
            self.ctx.gateway.generate_thumbnail(&prompt),
        )
        .await
        .into_result("thumbnail regeneration")
    }

    pub async fn regenerate_narration(&self) -> StudioResult<()> {
        let snapshot = self.production_snapshot("regenerate the narration")?;
        let text = snapshot
            .script_package
            .as_ref()
            .map(|p| p.full_narration_text.clone())
            .unwrap_or_default();

        tracing::info!("🔁 Regenerating narration");
        run_task(
            &self.ctx,
            snapshot.session,
            &self.ctx.session_token(),
            TaskTarget::Narration,
            self.ctx.gateway.generate_narration(&text),
        )
        .await
        .into_result("narration regeneration")
    }

    /// Replace the image of one generated reference candidate.
    pub async fn regenerate_reference_variant(&self, candidate_id: &str) -> StudioResult<()> {
        let snapshot = self.ctx.store.snapshot();
        if snapshot.stage != Stage::ReferenceSelection {
            return Err(StudioError::PreconditionError(
                "reference variants can only be regenerated while choosing a reference".to_string(),
            ));
        }
        match snapshot.reference_candidate(candidate_id) {
            Some(candidate) if candidate.origin == ReferenceOrigin::Generated => {}
            Some(_) => {
                return Err(StudioError::PreconditionError(
                    "uploaded references cannot be regenerated".to_string(),
                ))
            }
            None => {
                return Err(StudioError::PreconditionError(format!(
                    "unknown reference {}",
                    candidate_id
                )))
            }
        }
        let prompt = snapshot
            .script_package
            .as_ref()
            .map(|p| p.main_reference_prompt.clone())
            .unwrap_or_default();

        let gateway = Arc::clone(&self.ctx.gateway);
        let call = async move {
            let image = gateway.generate_reference_variant(&prompt).await?;
            if !image.is_image() {
                return Err(StudioError::MissingArtifact("reference image".to_string()));
            }
            Ok(image)
        };

        tracing::info!("🔁 Regenerating reference {}", candidate_id);
        run_task(
            &self.ctx,
            snapshot.session,
            &self.ctx.session_token(),
            TaskTarget::ReferenceVariant(candidate_id.to_string()),
            call,
        )
        .await
        .into_result("reference regeneration")
    }

    /// Turn a finished scene image into a motion clip. Polls the job at
    /// `motion_poll_interval`, at most `motion_max_polls` times. A restart, a
    /// replaced scene image or a newer animation of the same scene stops the
    /// polling.
    pub async fn animate_scene(&self, segment_id: &str) -> StudioResult<()> {
        let snapshot = self.production_snapshot("animate a scene")?;
        let segment = snapshot
            .segment(segment_id)
            .ok_or_else(|| StudioError::PreconditionError(format!("unknown segment {}", segment_id)))?;
        let image = segment.image_value().cloned().ok_or_else(|| {
            StudioError::PreconditionError("a scene needs a finished image before it can be animated".to_string())
        })?;
        let prompt = segment.image_prompt.clone();

        self.ctx.credentials.ensure_motion_access().await?;

        tracing::info!("🎞️ Animating scene {}", segment_id);
        let ticket = self.ctx.store.next_ticket();
        run_ticketed_task(
            &self.ctx,
            snapshot.session,
            &self.ctx.session_token(),
            TaskTarget::SceneMotion(segment_id.to_string()),
            ticket,
            self.generate_motion(segment_id, ticket, image, prompt),
        )
        .await
        .into_result("scene animation")
    }

    async fn generate_motion(
        &self,
        segment_id: &str,
        ticket: Ticket,
        image: BinaryRef,
        prompt: String,
    ) -> StudioResult<BinaryRef> {
        let job = self.ctx.gateway.start_scene_motion(&image, &prompt).await?;
        let interval = self.ctx.config.motion_poll_interval;
        let max_polls = self.ctx.config.motion_max_polls;

        for attempt in 1..=max_polls {
            tokio::time::sleep(interval).await;

            let still_wanted = self
                .ctx
                .store
                .snapshot()
                .segment(segment_id)
                .and_then(|s| s.motion.as_ref())
                .map(|m| m.is_pending_for(ticket))
                .unwrap_or(false);
            if !still_wanted {
                return Err(StudioError::Cancelled(format!(
                    "motion for scene {} is no longer wanted",
                    segment_id
                )));
            }

            match self.ctx.gateway.poll_scene_motion(&job).await? {
                MotionStatus::Running => {
                    tracing::debug!("⏳ Motion job {} still running ({}/{})", job.name, attempt, max_polls);
                }
                MotionStatus::Completed(clip) => return Ok(clip),
                MotionStatus::Failed(reason) => return Err(StudioError::FetchFailure(reason)),
            }
        }

        Err(StudioError::FetchFailure(format!(
            "motion generation timed out after {} polls",
            max_polls
        )))
    }
}
