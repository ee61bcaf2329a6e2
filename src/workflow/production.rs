// src/workflow/production.rs
//! SegmentOrchestrator - the three Production streams.
//!
//! Narration and thumbnail are single tasks; scenes form an ordered work
//! queue processed by one worker (or `scene_concurrency` workers). Every
//! completion lands in the store as its own `TaskFinished` update, so the
//! streams never write the same field and never clobber each other.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::{TaskTarget, WorkflowUpdate};
use super::StudioContext;
use crate::error::{StudioError, StudioResult};
use crate::models::{BinaryRef, ScriptPackage, Segment, Stage, Ticket};

/// How one generation ended from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(StudioError),
    /// The slot moved on (restart, newer call, cancellation) before this call
    /// could be recorded, or the call was never issued.
    Superseded,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }

    pub fn into_result(self, what: &str) -> StudioResult<()> {
        match self {
            TaskOutcome::Succeeded => Ok(()),
            TaskOutcome::Failed(err) => Err(err),
            TaskOutcome::Superseded => Err(StudioError::Cancelled(format!("{} was superseded", what))),
        }
    }
}

/// Mark `target` pending, await `call`, then record the result. The result
/// only lands if the slot still holds this call's ticket.
pub(crate) async fn run_task<Fut>(
    ctx: &StudioContext,
    session: u64,
    token: &CancellationToken,
    target: TaskTarget,
    call: Fut,
) -> TaskOutcome
where
    Fut: Future<Output = StudioResult<BinaryRef>>,
{
    run_ticketed_task(ctx, session, token, target, ctx.store.next_ticket(), call).await
}

/// `run_task` with a ticket the caller drew beforehand, for calls that need
/// to check their own slot while they run.
pub(crate) async fn run_ticketed_task<Fut>(
    ctx: &StudioContext,
    session: u64,
    token: &CancellationToken,
    target: TaskTarget,
    ticket: Ticket,
    call: Fut,
) -> TaskOutcome
where
    Fut: Future<Output = StudioResult<BinaryRef>>,
{
    if !ctx.store.dispatch(WorkflowUpdate::TaskStarted {
        session,
        target: target.clone(),
        ticket,
    }) {
        tracing::debug!("⏭️ Not starting {}: slot not available", target.describe());
        return TaskOutcome::Superseded;
    }

    let result = tokio::select! {
        _ = token.cancelled() => Err(StudioError::Cancelled(format!("{} was cancelled", target.describe()))),
        result = call => result,
    };

    let applied = ctx.store.dispatch(WorkflowUpdate::TaskFinished {
        session,
        target: target.clone(),
        ticket,
        outcome: result.as_ref().map(Clone::clone).map_err(ToString::to_string),
    });

    match result {
        _ if !applied => {
            tracing::debug!("⏭️ Dropped result for {}: superseded", target.describe());
            TaskOutcome::Superseded
        }
        Ok(_) => {
            tracing::info!("✅ {} ready", target.describe());
            TaskOutcome::Succeeded
        }
        Err(StudioError::Cancelled(reason)) => {
            tracing::info!("🛑 {}", reason);
            TaskOutcome::Superseded
        }
        Err(err) => {
            tracing::warn!("❌ {} failed: {}", target.describe(), err);
            TaskOutcome::Failed(err)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProductionReport {
    pub narration: TaskOutcome,
    pub thumbnail: TaskOutcome,
    /// Per segment, in playback order.
    pub scenes: Vec<(String, TaskOutcome)>,
}

impl ProductionReport {
    pub fn scenes_succeeded(&self) -> usize {
        self.scenes.iter().filter(|(_, outcome)| outcome.is_success()).count()
    }

    pub fn failed_scenes(&self) -> Vec<&str> {
        self.scenes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TaskOutcome::Failed(_)))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Handle to a running Production. Dropping it does not stop the work.
pub struct ProductionRun {
    handle: JoinHandle<ProductionReport>,
    token: CancellationToken,
}

impl ProductionRun {
    /// Stop issuing scene calls and settle in-flight ones as cancelled.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn wait(self) -> StudioResult<ProductionReport> {
        self.handle
            .await
            .map_err(|e| StudioError::Cancelled(format!("production task aborted: {}", e)))
    }
}

#[derive(Clone)]
pub struct SegmentOrchestrator {
    ctx: Arc<StudioContext>,
}

impl SegmentOrchestrator {
    pub fn new(ctx: Arc<StudioContext>) -> Self {
        Self { ctx }
    }

    /// Launch narration, thumbnail and the scene queue for the current
    /// Production stage.
    pub fn start(&self) -> StudioResult<ProductionRun> {
        let snapshot = self.ctx.store.snapshot();
        if snapshot.stage != Stage::Production {
            return Err(StudioError::PreconditionError(
                "production starts only after a reference is selected".to_string(),
            ));
        }
        let (Some(reference), Some(package)) = (snapshot.selected_reference, snapshot.script_package) else {
            return Err(StudioError::PreconditionError(
                "production needs a script and a selected reference".to_string(),
            ));
        };

        let token = self.ctx.session_token().child_token();
        let ctx = Arc::clone(&self.ctx);
        let run_token = token.clone();
        let session = snapshot.session;

        tracing::info!(
            "🎬 Starting production of '{}' ({} segments)",
            package.title,
            package.segments.len()
        );
        let handle = tokio::spawn(async move {
            drive_production(&ctx, session, &run_token, &reference.image, &package).await
        });

        Ok(ProductionRun { handle, token })
    }
}

async fn drive_production(
    ctx: &StudioContext,
    session: u64,
    token: &CancellationToken,
    reference: &BinaryRef,
    package: &ScriptPackage,
) -> ProductionReport {
    let narration = run_task(
        ctx,
        session,
        token,
        TaskTarget::Narration,
        ctx.gateway.generate_narration(&package.full_narration_text),
    );
    let thumbnail = run_task(
        ctx,
        session,
        token,
        TaskTarget::Thumbnail,
        ctx.gateway.generate_thumbnail(&package.thumbnail_prompt),
    );
    let scenes = run_scene_queue(ctx, session, token, reference, &package.segments);

    let (narration, thumbnail, scenes) = tokio::join!(narration, thumbnail, scenes);

    let report = ProductionReport {
        narration,
        thumbnail,
        scenes,
    };
    tracing::info!(
        "🏁 Production settled: {}/{} scenes, narration ok: {}, thumbnail ok: {}",
        report.scenes_succeeded(),
        report.scenes.len(),
        report.narration.is_success(),
        report.thumbnail.is_success()
    );
    report
}

/// Ordered scene work queue. With the default concurrency of 1, segment
/// `i + 1` is only issued once segment `i` has resolved either way.
fn run_scene_queue<'a>(
    ctx: &'a StudioContext,
    session: u64,
    token: &'a CancellationToken,
    reference: &'a BinaryRef,
    segments: &'a [Segment],
) -> futures::future::BoxFuture<'a, Vec<(String, TaskOutcome)>> {
    let limit = ctx.config.scene_concurrency.max(1);

    Box::pin(stream::iter(segments)
        .map(move |segment: &'a Segment| async move {
            if token.is_cancelled() {
                return (segment.id.clone(), TaskOutcome::Superseded);
            }
            tracing::info!("🖼️ Scene {}/{}", segment.index + 1, segments.len());
            let outcome = run_task(
                ctx,
                session,
                token,
                TaskTarget::SceneImage(segment.id.clone()),
                ctx.gateway.generate_scene_image(reference, &segment.image_prompt),
            )
            .await;
            (segment.id.clone(), outcome)
        })
        .buffered(limit)
        .collect())
}
