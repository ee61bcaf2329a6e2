// src/gateway/schema.rs
//! Structural validation of gateway payloads.
//!
//! Nothing partially shaped reaches the aggregate: each payload is either
//! turned into complete domain entities (with locally assigned ids) or
//! rejected as `MalformedResponse`.

use uuid::Uuid;

use super::{IdeaDraft, NewsDraft, ScriptDraft};
use crate::error::StudioError;
use crate::models::workflow::SEGMENT_SECONDS;
use crate::models::{BinaryRef, IdeationOption, NewsItem, ReferenceCandidate, ReferenceOrigin, ScriptPackage, Segment, TaskState};

pub const MAX_NEWS_ITEMS: usize = 5;
pub const IDEA_COUNT: usize = 3;
pub const SEGMENT_COUNT: usize = 10;
pub const MAX_TAGS: usize = 15;
pub const REFERENCE_VARIANT_COUNT: usize = 4;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn malformed(what: &str, detail: String) -> StudioError {
    tracing::warn!("🧪 Malformed {} response: {}", what, detail);
    StudioError::MalformedResponse(format!("{}: {}", what, detail))
}

fn required(what: &str, field: &str, value: &str) -> Result<String, StudioError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(malformed(what, format!("missing {}", field)));
    }
    Ok(trimmed.to_string())
}

pub fn validate_news(drafts: Vec<NewsDraft>) -> Result<Vec<NewsItem>, StudioError> {
    if drafts.is_empty() || drafts.len() > MAX_NEWS_ITEMS {
        return Err(malformed(
            "news",
            format!("expected 1..={} items, got {}", MAX_NEWS_ITEMS, drafts.len()),
        ));
    }

    drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| {
            Ok(NewsItem {
                id: new_id(),
                title: required("news", &format!("title of item {}", i), &draft.title)?,
                snippet: required("news", &format!("snippet of item {}", i), &draft.snippet)?,
                source_url: draft.source_url.trim().to_string(),
            })
        })
        .collect()
}

pub fn validate_ideas(drafts: Vec<IdeaDraft>) -> Result<Vec<IdeationOption>, StudioError> {
    if drafts.len() != IDEA_COUNT {
        return Err(malformed(
            "ideation",
            format!("expected {} options, got {}", IDEA_COUNT, drafts.len()),
        ));
    }

    drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| {
            Ok(IdeationOption {
                id: new_id(),
                title: required("ideation", &format!("title of option {}", i), &draft.title)?,
                description: required("ideation", &format!("description of option {}", i), &draft.description)?,
            })
        })
        .collect()
}

/// Validate a script and assign stable segment ids. Wrong segment counts are
/// rejected outright, never truncated or padded.
pub fn normalize_script(draft: ScriptDraft) -> Result<ScriptPackage, StudioError> {
    if draft.segments.len() != SEGMENT_COUNT {
        return Err(malformed(
            "script",
            format!("expected {} segments, got {}", SEGMENT_COUNT, draft.segments.len()),
        ));
    }

    let title = required("script", "title", &draft.title)?;
    let full_narration_text = required("script", "fullNarrationText", &draft.full_narration_text)?;
    let thumbnail_prompt = required("script", "thumbnailPrompt", &draft.thumbnail_prompt)?;
    let main_reference_prompt = required("script", "mainReferencePrompt", &draft.main_reference_prompt)?;

    let segments = draft
        .segments
        .into_iter()
        .enumerate()
        .map(|(index, seg)| {
            let start = index as u32 * SEGMENT_SECONDS;
            let time_offset = match seg.time_offset.trim() {
                "" => format!("{}-{}s", start, start + SEGMENT_SECONDS),
                given => given.to_string(),
            };
            Ok(Segment {
                id: new_id(),
                index,
                time_offset,
                narration_text: required("script", &format!("narrationText of segment {}", index), &seg.narration_text)?,
                image_prompt: required("script", &format!("imagePrompt of segment {}", index), &seg.image_prompt)?,
                image: None,
                motion: None,
            })
        })
        .collect::<Result<Vec<_>, StudioError>>()?;

    // Tags are descriptive metadata: blanks are dropped and the list is capped.
    let tags = draft
        .tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .collect();

    Ok(ScriptPackage {
        title,
        description: draft.description.trim().to_string(),
        tags,
        call_to_action: draft.call_to_action.trim().to_string(),
        thumbnail_prompt,
        main_reference_prompt,
        full_narration_text,
        segments,
        thumbnail: None,
        narration: None,
    })
}

pub fn validate_reference_variants(images: Vec<BinaryRef>) -> Result<Vec<ReferenceCandidate>, StudioError> {
    if images.len() != REFERENCE_VARIANT_COUNT {
        return Err(malformed(
            "reference variants",
            format!("expected {} images, got {}", REFERENCE_VARIANT_COUNT, images.len()),
        ));
    }
    if let Some(bad) = images.iter().find(|img| !img.is_image()) {
        return Err(malformed(
            "reference variants",
            format!("unexpected mime type {}", bad.mime_type()),
        ));
    }

    Ok(images
        .into_iter()
        .map(|image| ReferenceCandidate {
            id: new_id(),
            image: TaskState::Success(image),
            origin: ReferenceOrigin::Generated,
        })
        .collect())
}
