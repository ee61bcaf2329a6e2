// src/gateway/mock.rs
//! Scripted in-memory gateway for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use super::{
    ArtifactFetcher, ConfiguredCredentials, GenerationGateway, IdeaDraft, MotionJob, MotionStatus,
    NewsDraft, ScriptDraft, SegmentDraft,
};
use crate::config::StudioConfig;
use crate::error::StudioError;
use crate::models::BinaryRef;
use crate::studio::Studio;
use crate::workflow::ReferenceChoice;

#[derive(Default)]
struct Script {
    news_error: Option<StudioError>,
    news_count: Option<usize>,
    ideas_error: Option<StudioError>,
    ideas_gate: Option<oneshot::Receiver<()>>,
    segment_count: Option<usize>,
    variants_error: Option<StudioError>,
    failing_prompts: HashSet<String>,
    empty_prompts: HashSet<String>,
    thumbnail_error: Option<StudioError>,
    narration_error: Option<StudioError>,
    narration_gate: Option<oneshot::Receiver<()>>,
    scene_gates: HashMap<String, oneshot::Receiver<()>>,
    motion_polls: usize,
    motion_failure: Option<String>,
    motion_polled: HashMap<String, usize>,
    images_issued: u32,
}

/// Succeeds at everything by default; individual calls can be made to fail,
/// return nothing, or block until released.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
}

pub fn segment_prompt(index: usize) -> String {
    format!("scene {}", index)
}

pub fn script_draft(segments: usize) -> ScriptDraft {
    ScriptDraft {
        title: "Rates Cut Again".to_string(),
        description: "What the surprise cut means for you".to_string(),
        tags: vec!["economy".to_string(), "rates".to_string(), "news".to_string()],
        call_to_action: "Follow for daily explainers".to_string(),
        thumbnail_prompt: "bold red arrow pointing down".to_string(),
        main_reference_prompt: "flat editorial illustration, warm palette".to_string(),
        full_narration_text: "The central bank cut rates again today.".to_string(),
        segments: (0..segments)
            .map(|i| SegmentDraft {
                time_offset: String::new(),
                narration_text: format!("line {}", i),
                image_prompt: segment_prompt(i),
            })
            .collect(),
    }
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap();
        f(&mut script)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn fail_news(&self, err: StudioError) {
        self.with(|s| s.news_error = Some(err));
    }

    pub fn return_news(&self, count: usize) {
        self.with(|s| s.news_count = Some(count));
    }

    pub fn fail_ideas(&self, err: StudioError) {
        self.with(|s| s.ideas_error = Some(err));
    }

    pub fn succeed_ideas(&self) {
        self.with(|s| s.ideas_error = None);
    }

    /// Ideation blocks until the returned sender fires (or is dropped).
    pub fn gate_ideas(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.ideas_gate = Some(rx));
        tx
    }

    pub fn return_segments(&self, count: usize) {
        self.with(|s| s.segment_count = Some(count));
    }

    pub fn fail_variants(&self, err: StudioError) {
        self.with(|s| s.variants_error = Some(err));
    }

    pub fn fail_prompt(&self, prompt: impl Into<String>) {
        self.with(|s| s.failing_prompts.insert(prompt.into()));
    }

    pub fn succeed_prompt(&self, prompt: &str) {
        self.with(|s| s.failing_prompts.remove(prompt));
    }

    /// The scene call for `prompt` "succeeds" without an image.
    pub fn empty_prompt(&self, prompt: impl Into<String>) {
        self.with(|s| s.empty_prompts.insert(prompt.into()));
    }

    pub fn fail_thumbnail(&self, err: StudioError) {
        self.with(|s| s.thumbnail_error = Some(err));
    }

    pub fn fail_narration(&self, err: StudioError) {
        self.with(|s| s.narration_error = Some(err));
    }

    /// Narration blocks until the returned sender fires (or is dropped).
    pub fn gate_narration(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.narration_gate = Some(rx));
        tx
    }

    /// The next scene call for `prompt` blocks until released.
    pub fn gate_scene(&self, prompt: impl Into<String>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.scene_gates.insert(prompt.into(), rx));
        tx
    }

    pub fn motion_after_polls(&self, polls: usize) {
        self.with(|s| s.motion_polls = polls);
    }

    pub fn fail_motion(&self, message: impl Into<String>) {
        self.with(|s| s.motion_failure = Some(message.into()));
    }

    fn next_image(&self, tag: &str) -> BinaryRef {
        let n = self.with(|s| {
            s.images_issued += 1;
            s.images_issued
        });
        BinaryRef::inline("image/png", format!("{}#{}", tag, n).into_bytes())
    }
}

async fn wait_for(gate: Option<oneshot::Receiver<()>>) {
    if let Some(gate) = gate {
        let _ = gate.await;
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn fetch_news(&self) -> Result<Vec<NewsDraft>, StudioError> {
        self.record("news");
        let (error, count) = self.with(|s| (s.news_error.clone(), s.news_count.unwrap_or(3)));
        if let Some(err) = error {
            return Err(err);
        }
        Ok((0..count)
            .map(|i| NewsDraft {
                title: format!("Headline {}", i),
                snippet: format!("Snippet {}", i),
                source_url: format!("https://news.test/{}", i),
            })
            .collect())
    }

    async fn generate_ideas(&self, title: &str, _snippet: &str) -> Result<Vec<IdeaDraft>, StudioError> {
        self.record(format!("ideas:{}", title));
        let gate = self.with(|s| s.ideas_gate.take());
        wait_for(gate).await;
        if let Some(err) = self.with(|s| s.ideas_error.clone()) {
            return Err(err);
        }
        Ok((0..3)
            .map(|i| IdeaDraft {
                title: format!("Angle {}", i),
                description: format!("Angle {} on {}", i, title),
            })
            .collect())
    }

    async fn generate_script(
        &self,
        idea_title: &str,
        _idea_description: &str,
    ) -> Result<ScriptDraft, StudioError> {
        self.record(format!("script:{}", idea_title));
        Ok(script_draft(self.with(|s| s.segment_count.unwrap_or(10))))
    }

    async fn generate_reference_variants(&self, _prompt: &str) -> Result<Vec<BinaryRef>, StudioError> {
        self.record("variants");
        if let Some(err) = self.with(|s| s.variants_error.clone()) {
            return Err(err);
        }
        Ok((0..4).map(|_| self.next_image("reference")).collect())
    }

    async fn generate_thumbnail(&self, _prompt: &str) -> Result<BinaryRef, StudioError> {
        self.record("thumbnail");
        if let Some(err) = self.with(|s| s.thumbnail_error.clone()) {
            return Err(err);
        }
        Ok(self.next_image("thumbnail"))
    }

    async fn generate_narration(&self, _text: &str) -> Result<BinaryRef, StudioError> {
        self.record("narration");
        let (gate, error) = self.with(|s| (s.narration_gate.take(), s.narration_error.clone()));
        wait_for(gate).await;
        if let Some(err) = error {
            return Err(err);
        }
        Ok(BinaryRef::inline("audio/wav", b"RIFFnarration".to_vec()))
    }

    async fn generate_scene_image(
        &self,
        _reference: &BinaryRef,
        prompt: &str,
    ) -> Result<BinaryRef, StudioError> {
        self.record(format!("scene:{}", prompt));
        let gate = self.with(|s| s.scene_gates.remove(prompt));
        wait_for(gate).await;

        let (failing, empty) = self.with(|s| (s.failing_prompts.contains(prompt), s.empty_prompts.contains(prompt)));
        if failing {
            return Err(StudioError::FetchFailure(format!("quota exceeded for {}", prompt)));
        }
        if empty {
            return Err(StudioError::MissingArtifact("scene image".to_string()));
        }
        Ok(self.next_image(prompt))
    }

    async fn start_scene_motion(
        &self,
        _scene_image: &BinaryRef,
        prompt: &str,
    ) -> Result<MotionJob, StudioError> {
        self.record(format!("motion:{}", prompt));
        Ok(MotionJob {
            name: format!("operations/{}", prompt.replace(' ', "-")),
        })
    }

    async fn poll_scene_motion(&self, job: &MotionJob) -> Result<MotionStatus, StudioError> {
        self.record(format!("poll:{}", job.name));
        let (polled, needed, failure) = self.with(|s| {
            let polled = s.motion_polled.entry(job.name.clone()).or_insert(0);
            *polled += 1;
            (*polled, s.motion_polls, s.motion_failure.clone())
        });

        if polled < needed {
            return Ok(MotionStatus::Running);
        }
        Ok(match failure {
            Some(message) => MotionStatus::Failed(message),
            None => MotionStatus::Completed(BinaryRef::remote(
                "video/mp4",
                format!("https://files.test/{}.mp4", job.name),
            )),
        })
    }
}

/// Serves remote artifacts from memory; anything unknown has "expired".
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, uri: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(uri.into(), bytes);
    }
}

#[async_trait]
impl ArtifactFetcher for MemoryFetcher {
    async fn fetch_remote(&self, uri: &str) -> Result<Vec<u8>, StudioError> {
        self.files
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| StudioError::FetchFailure(format!("{} has expired", uri)))
    }
}

/// Defaults tuned for tests: motion polls are near-instant and tightly bounded.
pub fn test_config() -> StudioConfig {
    StudioConfig {
        motion_poll_interval: Duration::from_millis(1),
        motion_max_polls: 5,
        motion_enabled: true,
        ..StudioConfig::default()
    }
}

pub fn test_studio(gateway: Arc<ScriptedGateway>, fetcher: Arc<MemoryFetcher>) -> Studio {
    Studio::new(
        gateway,
        fetcher,
        Arc::new(ConfiguredCredentials {
            api_key_present: true,
            motion_enabled: true,
        }),
        test_config(),
    )
}

/// Walks a fresh studio through News, Ideation and Script into ReferenceSelection.
pub async fn studio_at_reference_selection(gateway: Arc<ScriptedGateway>, fetcher: Arc<MemoryFetcher>) -> Studio {
    let studio = test_studio(gateway, fetcher);
    let news = studio.enter_news().await.unwrap();
    let ideas = studio.select_news(&news[0].id).await.unwrap();
    studio.select_idea(&ideas[0].id).await.unwrap();
    studio.request_reference_variants().await.unwrap();
    studio
}

/// Studio whose initial production run has fully settled.
pub async fn studio_in_production(gateway: Arc<ScriptedGateway>, fetcher: Arc<MemoryFetcher>) -> Studio {
    let studio = studio_at_reference_selection(gateway, fetcher).await;
    let candidate = studio.snapshot().reference_candidates[0].id.clone();
    studio.select_reference(ReferenceChoice::Candidate(candidate)).unwrap();
    studio.wait_for_production().await.unwrap();
    studio
}
