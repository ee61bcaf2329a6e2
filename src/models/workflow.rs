// src/models/workflow.rs
use serde::{Deserialize, Serialize};

use super::binary::BinaryRef;
use super::task::{success_value, TaskState};

/// Seconds of narration covered by one segment.
pub const SEGMENT_SECONDS: u32 = 3;

/// Fixed linear workflow. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    News,
    Ideation,
    Script,
    ReferenceSelection,
    Production,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::News => "news",
            Stage::Ideation => "ideation",
            Stage::Script => "script",
            Stage::ReferenceSelection => "reference-selection",
            Stage::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeationOption {
    pub id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: String,
    /// Zero-based playback position; fixed for the segment's lifetime.
    pub index: usize,
    pub time_offset: String,
    pub narration_text: String,
    pub image_prompt: String,
    /// `None` until the first image generation is issued.
    pub image: Option<TaskState<BinaryRef>>,
    /// `None` when no motion clip exists (or it was invalidated by a new image).
    pub motion: Option<TaskState<BinaryRef>>,
}

impl Segment {
    pub fn start_seconds(&self) -> u32 {
        self.index as u32 * SEGMENT_SECONDS
    }

    pub fn image_value(&self) -> Option<&BinaryRef> {
        success_value(&self.image)
    }

    pub fn motion_value(&self) -> Option<&BinaryRef> {
        success_value(&self.motion)
    }

    /// Motion clip when available, otherwise the still frame.
    pub fn preferred_artifact(&self) -> Option<&BinaryRef> {
        self.motion_value().or_else(|| self.image_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPackage {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub call_to_action: String,
    pub thumbnail_prompt: String,
    pub main_reference_prompt: String,
    pub full_narration_text: String,
    /// Length and order are fixed when the script is published.
    pub segments: Vec<Segment>,
    pub thumbnail: Option<TaskState<BinaryRef>>,
    pub narration: Option<TaskState<BinaryRef>>,
}

impl ScriptPackage {
    pub fn segment(&self, segment_id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == segment_id)
    }

    pub fn segment_mut(&mut self, segment_id: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.id == segment_id)
    }

    pub fn thumbnail_value(&self) -> Option<&BinaryRef> {
        success_value(&self.thumbnail)
    }

    pub fn narration_value(&self) -> Option<&BinaryRef> {
        success_value(&self.narration)
    }

    /// True once narration, thumbnail and every scene image have left `pending`.
    pub fn production_settled(&self) -> bool {
        let settled = |slot: &Option<TaskState<BinaryRef>>| {
            slot.as_ref().map(TaskState::is_terminal).unwrap_or(false)
        };
        settled(&self.narration)
            && settled(&self.thumbnail)
            && self.segments.iter().all(|s| settled(&s.image))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceOrigin {
    Generated,
    Uploaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceCandidate {
    pub id: String,
    pub image: TaskState<BinaryRef>,
    pub origin: ReferenceOrigin,
}

/// The anchor image used for every scene generation during Production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedReference {
    pub candidate_id: String,
    pub image: BinaryRef,
    pub origin: ReferenceOrigin,
}

/// Everything produced so far. Owned by the `WorkflowStore`; every change is
/// a whole-value replacement computed by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkflowAggregate {
    /// Incremented on every applied update.
    pub version: u64,
    /// Incremented on restart; work started under an older session is ignored.
    pub session: u64,
    pub stage: Stage,
    pub news_candidates: Vec<NewsItem>,
    pub selected_news: Option<NewsItem>,
    pub ideation_options: Vec<IdeationOption>,
    pub selected_idea: Option<IdeationOption>,
    pub script_package: Option<ScriptPackage>,
    pub reference_candidates: Vec<ReferenceCandidate>,
    pub selected_reference: Option<SelectedReference>,
}

impl WorkflowAggregate {
    /// A stage never becomes observable without the data it requires.
    pub fn is_consistent(&self) -> bool {
        let stage = self.stage;
        if stage >= Stage::Ideation
            && (self.selected_news.is_none() || self.ideation_options.is_empty())
        {
            return false;
        }
        if stage >= Stage::Script && (self.selected_idea.is_none() || self.script_package.is_none()) {
            return false;
        }
        if stage >= Stage::ReferenceSelection && self.reference_candidates.is_empty() {
            return false;
        }
        if stage == Stage::Production && self.selected_reference.is_none() {
            return false;
        }
        // Later-stage fields stay absent until their stage is entered.
        if stage < Stage::Script && self.script_package.is_some() {
            return false;
        }
        if stage < Stage::Production && self.selected_reference.is_some() {
            return false;
        }
        true
    }

    pub fn segment(&self, segment_id: &str) -> Option<&Segment> {
        self.script_package.as_ref().and_then(|p| p.segment(segment_id))
    }

    pub fn reference_candidate(&self, candidate_id: &str) -> Option<&ReferenceCandidate> {
        self.reference_candidates.iter().find(|c| c.id == candidate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::Ticket;

    fn segment(index: usize) -> Segment {
        Segment {
            id: format!("seg-{}", index),
            index,
            time_offset: String::new(),
            narration_text: "line".into(),
            image_prompt: "prompt".into(),
            image: None,
            motion: None,
        }
    }

    #[test]
    fn test_stage_order_is_linear() {
        assert!(Stage::News < Stage::Ideation);
        assert!(Stage::Ideation < Stage::Script);
        assert!(Stage::Script < Stage::ReferenceSelection);
        assert!(Stage::ReferenceSelection < Stage::Production);
        assert_eq!(Stage::default(), Stage::News);
    }

    #[test]
    fn test_preferred_artifact_prefers_motion() {
        let still = BinaryRef::inline("image/png", vec![1]);
        let clip = BinaryRef::remote("video/mp4", "https://example.test/clip");
        let mut seg = segment(4);
        assert!(seg.preferred_artifact().is_none());

        seg.image = Some(TaskState::Success(still.clone()));
        assert_eq!(seg.preferred_artifact(), Some(&still));

        seg.motion = Some(TaskState::Pending(Ticket(1)));
        assert_eq!(seg.preferred_artifact(), Some(&still));

        seg.motion = Some(TaskState::Success(clip.clone()));
        assert_eq!(seg.preferred_artifact(), Some(&clip));
        assert_eq!(seg.start_seconds(), 12);
    }

    #[test]
    fn test_default_aggregate_is_consistent() {
        let aggregate = WorkflowAggregate::default();
        assert!(aggregate.is_consistent());

        let broken = WorkflowAggregate {
            stage: Stage::Ideation,
            ..Default::default()
        };
        assert!(!broken.is_consistent());
    }
}
