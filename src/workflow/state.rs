// src/workflow/state.rs
//! WorkflowStore - the single mutable aggregate, updated only through a reducer.
//!
//! Every writer describes *what* changed as a `WorkflowUpdate`; the store
//! applies it to the latest aggregate inside one atomic commit and replaces the
//! whole value. No writer ever holds a snapshot across an await and writes it
//! back, so concurrently completing tasks compose without lost updates.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::models::{
    BinaryRef, IdeationOption, NewsItem, ReferenceCandidate, ReferenceOrigin, ScriptPackage,
    SelectedReference, Stage, TaskState, Ticket, WorkflowAggregate,
};

/// The slot an asynchronous generation writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    Narration,
    Thumbnail,
    SceneImage(String),
    SceneMotion(String),
    ReferenceVariant(String),
}

impl TaskTarget {
    pub fn describe(&self) -> String {
        match self {
            TaskTarget::Narration => "narration".to_string(),
            TaskTarget::Thumbnail => "thumbnail".to_string(),
            TaskTarget::SceneImage(id) => format!("scene image {}", id),
            TaskTarget::SceneMotion(id) => format!("scene motion {}", id),
            TaskTarget::ReferenceVariant(id) => format!("reference variant {}", id),
        }
    }
}

/// One discrete state-merge event.
#[derive(Debug, Clone)]
pub enum WorkflowUpdate {
    NewsFetched {
        session: u64,
        items: Vec<NewsItem>,
    },
    NewsSelected {
        session: u64,
        item: NewsItem,
    },
    IdeationReady {
        session: u64,
        news_id: String,
        options: Vec<IdeationOption>,
    },
    IdeaSelected {
        session: u64,
        idea: IdeationOption,
    },
    ScriptReady {
        session: u64,
        idea_id: String,
        package: ScriptPackage,
    },
    ReferenceVariantsReady {
        session: u64,
        candidates: Vec<ReferenceCandidate>,
    },
    ReferenceUploaded {
        session: u64,
        candidate: ReferenceCandidate,
    },
    ReferenceSelected {
        session: u64,
        reference: SelectedReference,
    },
    TaskStarted {
        session: u64,
        target: TaskTarget,
        ticket: Ticket,
    },
    TaskFinished {
        session: u64,
        target: TaskTarget,
        ticket: Ticket,
        outcome: Result<BinaryRef, String>,
    },
    Restart,
}

impl WorkflowUpdate {
    fn session(&self) -> Option<u64> {
        match self {
            WorkflowUpdate::NewsFetched { session, .. }
            | WorkflowUpdate::NewsSelected { session, .. }
            | WorkflowUpdate::IdeationReady { session, .. }
            | WorkflowUpdate::IdeaSelected { session, .. }
            | WorkflowUpdate::ScriptReady { session, .. }
            | WorkflowUpdate::ReferenceVariantsReady { session, .. }
            | WorkflowUpdate::ReferenceUploaded { session, .. }
            | WorkflowUpdate::ReferenceSelected { session, .. }
            | WorkflowUpdate::TaskStarted { session, .. }
            | WorkflowUpdate::TaskFinished { session, .. } => Some(*session),
            WorkflowUpdate::Restart => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            WorkflowUpdate::NewsFetched { .. } => "NewsFetched",
            WorkflowUpdate::NewsSelected { .. } => "NewsSelected",
            WorkflowUpdate::IdeationReady { .. } => "IdeationReady",
            WorkflowUpdate::IdeaSelected { .. } => "IdeaSelected",
            WorkflowUpdate::ScriptReady { .. } => "ScriptReady",
            WorkflowUpdate::ReferenceVariantsReady { .. } => "ReferenceVariantsReady",
            WorkflowUpdate::ReferenceUploaded { .. } => "ReferenceUploaded",
            WorkflowUpdate::ReferenceSelected { .. } => "ReferenceSelected",
            WorkflowUpdate::TaskStarted { .. } => "TaskStarted",
            WorkflowUpdate::TaskFinished { .. } => "TaskFinished",
            WorkflowUpdate::Restart => "Restart",
        }
    }
}

/// Pure reducer: the next aggregate, or `None` when the update does not apply
/// to `current` (wrong stage, superseded session, stale ticket, unknown id).
pub fn reduce(current: &WorkflowAggregate, update: &WorkflowUpdate) -> Option<WorkflowAggregate> {
    if let Some(session) = update.session() {
        if session != current.session {
            return None;
        }
    }

    let mut next = current.clone();

    match update {
        WorkflowUpdate::NewsFetched { items, .. } => {
            if current.stage != Stage::News {
                return None;
            }
            next.news_candidates = items.clone();
        }

        WorkflowUpdate::NewsSelected { item, .. } => {
            if current.stage != Stage::News {
                return None;
            }
            next.selected_news = Some(item.clone());
            next.ideation_options.clear();
        }

        WorkflowUpdate::IdeationReady { news_id, options, .. } => {
            let selected = current.selected_news.as_ref().map(|n| n.id.as_str());
            if current.stage != Stage::News || selected != Some(news_id.as_str()) || options.is_empty() {
                return None;
            }
            next.ideation_options = options.clone();
            next.stage = Stage::Ideation;
        }

        WorkflowUpdate::IdeaSelected { idea, .. } => {
            if current.stage != Stage::Ideation {
                return None;
            }
            next.selected_idea = Some(idea.clone());
        }

        WorkflowUpdate::ScriptReady { idea_id, package, .. } => {
            let selected = current.selected_idea.as_ref().map(|i| i.id.as_str());
            if current.stage != Stage::Ideation || selected != Some(idea_id.as_str()) {
                return None;
            }
            next.script_package = Some(package.clone());
            next.stage = Stage::Script;
        }

        WorkflowUpdate::ReferenceVariantsReady { candidates, .. } => {
            if !matches!(current.stage, Stage::Script | Stage::ReferenceSelection) || candidates.is_empty() {
                return None;
            }
            // Uploaded references survive a fresh round of variants.
            let mut merged = candidates.clone();
            merged.extend(
                current
                    .reference_candidates
                    .iter()
                    .filter(|c| c.origin == ReferenceOrigin::Uploaded)
                    .cloned(),
            );
            next.reference_candidates = merged;
            next.stage = Stage::ReferenceSelection;
        }

        WorkflowUpdate::ReferenceUploaded { candidate, .. } => {
            if current.stage != Stage::ReferenceSelection {
                return None;
            }
            next.reference_candidates.push(candidate.clone());
        }

        WorkflowUpdate::ReferenceSelected { reference, .. } => {
            if current.stage != Stage::ReferenceSelection {
                return None;
            }
            next.selected_reference = Some(reference.clone());
            next.stage = Stage::Production;
        }

        WorkflowUpdate::TaskStarted { target, ticket, .. } => {
            let slot_stage = match target {
                TaskTarget::ReferenceVariant(_) => Stage::ReferenceSelection,
                _ => Stage::Production,
            };
            if current.stage != slot_stage {
                return None;
            }
            start_task(&mut next, target, *ticket)?;
        }

        WorkflowUpdate::TaskFinished {
            target,
            ticket,
            outcome,
            ..
        } => {
            let state = match outcome {
                Ok(value) => TaskState::Success(value.clone()),
                Err(message) => TaskState::Error(message.clone()),
            };
            finish_task(&mut next, target, *ticket, state)?;
        }

        WorkflowUpdate::Restart => {
            next = WorkflowAggregate {
                session: current.session + 1,
                news_candidates: current.news_candidates.clone(),
                ..Default::default()
            };
        }
    }

    next.version = current.version + 1;
    Some(next)
}

fn start_task(next: &mut WorkflowAggregate, target: &TaskTarget, ticket: Ticket) -> Option<()> {
    let pending = Some(TaskState::Pending(ticket));

    match target {
        TaskTarget::Narration => next.script_package.as_mut()?.narration = pending,
        TaskTarget::Thumbnail => next.script_package.as_mut()?.thumbnail = pending,
        TaskTarget::SceneImage(id) => {
            let segment = next.script_package.as_mut()?.segment_mut(id)?;
            // A new image invalidates any motion derived from the previous one.
            segment.motion = None;
            segment.image = pending;
        }
        TaskTarget::SceneMotion(id) => {
            let segment = next.script_package.as_mut()?.segment_mut(id)?;
            if !segment.image.as_ref().map(TaskState::is_success).unwrap_or(false) {
                return None;
            }
            segment.motion = pending;
        }
        TaskTarget::ReferenceVariant(id) => {
            let candidate = next.reference_candidates.iter_mut().find(|c| &c.id == id)?;
            candidate.image = TaskState::Pending(ticket);
        }
    }
    Some(())
}

fn finish_task(
    next: &mut WorkflowAggregate,
    target: &TaskTarget,
    ticket: Ticket,
    state: TaskState<BinaryRef>,
) -> Option<()> {
    fn settle(slot: &mut Option<TaskState<BinaryRef>>, ticket: Ticket, state: TaskState<BinaryRef>) -> Option<()> {
        if !slot.as_ref()?.is_pending_for(ticket) {
            return None;
        }
        *slot = Some(state);
        Some(())
    }

    match target {
        TaskTarget::Narration => settle(&mut next.script_package.as_mut()?.narration, ticket, state),
        TaskTarget::Thumbnail => settle(&mut next.script_package.as_mut()?.thumbnail, ticket, state),
        TaskTarget::SceneImage(id) => {
            let segment = next.script_package.as_mut()?.segment_mut(id)?;
            settle(&mut segment.image, ticket, state)
        }
        TaskTarget::SceneMotion(id) => {
            let segment = next.script_package.as_mut()?.segment_mut(id)?;
            settle(&mut segment.motion, ticket, state)
        }
        TaskTarget::ReferenceVariant(id) => {
            let candidate = next.reference_candidates.iter_mut().find(|c| &c.id == id)?;
            if !candidate.image.is_pending_for(ticket) {
                return None;
            }
            candidate.image = state;
            Some(())
        }
    }
}

/// Process-wide owner of the aggregate. Cloning the store is not supported;
/// share it behind an `Arc`.
pub struct WorkflowStore {
    tx: watch::Sender<WorkflowAggregate>,
    tickets: AtomicU64,
}

impl WorkflowStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkflowAggregate::default());
        Self {
            tx,
            tickets: AtomicU64::new(1),
        }
    }

    /// Apply one update atomically against the latest aggregate.
    /// Returns `false` when the reducer rejected it.
    pub fn dispatch(&self, update: WorkflowUpdate) -> bool {
        let applied = self.tx.send_if_modified(|aggregate| match reduce(aggregate, &update) {
            Some(next) => {
                debug_assert!(next.is_consistent(), "reducer produced inconsistent aggregate");
                *aggregate = next;
                true
            }
            None => false,
        });

        if applied {
            tracing::trace!("🧩 Applied {} (version {})", update.name(), self.tx.borrow().version);
        } else {
            tracing::debug!("🧩 Ignored {} (stale or out of stage)", update.name());
        }
        applied
    }

    pub fn snapshot(&self) -> WorkflowAggregate {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowAggregate> {
        self.tx.subscribe()
    }

    pub fn next_ticket(&self) -> Ticket {
        Ticket(self.tickets.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}
