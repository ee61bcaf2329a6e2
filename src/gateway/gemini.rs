// src/gateway/gemini.rs
//! GenerationGateway backed by the Gemini REST API (text, image, TTS, Veo).

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::prelude::*;
use regex::Regex;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::wav::{pcm_to_wav, sample_rate_from_mime, TTS_BITS_PER_SAMPLE, TTS_CHANNELS, TTS_SAMPLE_RATE};
use super::{
    ArtifactFetcher, GenerationGateway, IdeaDraft, MotionJob, MotionStatus, NewsDraft, ScriptDraft,
};
use crate::config::StudioConfig;
use crate::error::StudioError;
use crate::gateway::schema::{IDEA_COUNT, MAX_NEWS_ITEMS, MAX_TAGS, REFERENCE_VARIANT_COUNT, SEGMENT_COUNT};
use crate::models::BinaryRef;

const SHORTS_ASPECT_RATIO: &str = "9:16";

lazy_static::lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("valid fence regex");
}

#[derive(Debug, Clone)]
pub struct GeminiGateway {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    text_model: String,
    image_model: String,
    tts_model: String,
    video_model: String,
    voice: String,
    retry_window: Duration,
}

// ============================================================================
// WIRE STRUCTURES
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            parts,
            role: Some("user".to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String, // base64 encoded data
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PromptFeedback {
    #[serde(rename = "blockReason")]
    pub block_reason: Option<String>,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl GeminiGateway {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            tts_model: config.tts_model.clone(),
            video_model: config.video_model.clone(),
            voice: config.voice.clone(),
            retry_window: config.gateway_retry_window,
        }
    }

    fn key(&self) -> Result<&str, StudioError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| StudioError::CredentialRequired("GEMINI_API_KEY is not set".to_string()))
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    /// Send a request, retrying transport blips (connect/timeout, 429, 5xx)
    /// within the configured window. Generation failures are not retried.
    async fn send_json<F>(&self, label: &str, build: F) -> Result<Value, StudioError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed_time: Some(self.retry_window),
            ..Default::default()
        };

        let build = &build;
        let operation = move || async move {
            let response = build().send().await.map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!("Gemini {} connection error (retrying): {}", label, e);
                    backoff::Error::transient(StudioError::FetchFailure(format!("connection error: {}", e)))
                } else {
                    tracing::error!("Gemini {} request error: {}", label, e);
                    backoff::Error::permanent(StudioError::FetchFailure(format!("request error: {}", e)))
                }
            })?;

            let status = response.status();
            let body = response.text().await.map_err(|e| {
                backoff::Error::permanent(StudioError::FetchFailure(format!("failed to read response: {}", e)))
            })?;

            match status.as_u16() {
                429 | 500 | 502 | 503 => {
                    tracing::warn!("Gemini {} returned {} (retrying): {}", label, status, truncate(&body));
                    return Err(backoff::Error::transient(StudioError::FetchFailure(format!(
                        "API error ({}): {}",
                        status,
                        truncate(&body)
                    ))));
                }
                401 | 403 => {
                    tracing::error!("Gemini {} rejected the credential ({})", label, status);
                    return Err(backoff::Error::permanent(StudioError::CredentialRequired(format!(
                        "API key rejected ({})",
                        status
                    ))));
                }
                _ if !status.is_success() => {
                    tracing::error!("Gemini {} API error ({}): {}", label, status, truncate(&body));
                    return Err(backoff::Error::permanent(StudioError::FetchFailure(format!(
                        "API error ({}): {}",
                        status,
                        truncate(&body)
                    ))));
                }
                _ => {}
            }

            serde_json::from_str::<Value>(&body).map_err(|e| {
                backoff::Error::permanent(StudioError::MalformedResponse(format!(
                    "{} response is not JSON: {}",
                    label, e
                )))
            })
        };

        retry(backoff_config, operation).await
    }

    async fn generate_content(
        &self,
        label: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, StudioError> {
        let key = self.key()?;
        let url = self.model_url(model, "generateContent");

        tracing::debug!("Gemini {} request to {}", label, model);
        let raw = self
            .send_json(label, || self.client.post(&url).query(&[("key", key)]).json(request))
            .await?;

        let response: GenerateContentResponse = serde_json::from_value(raw)
            .map_err(|e| StudioError::MalformedResponse(format!("{} response: {}", label, e)))?;

        if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
            return Err(StudioError::FetchFailure(format!("{} prompt blocked: {}", label, reason)));
        }
        Ok(response)
    }

    /// Text generation whose answer must be JSON. Grounded requests use Google
    /// Search, which cannot be combined with a JSON response mime type, so the
    /// JSON is then extracted from free text.
    async fn generate_json<T: DeserializeOwned>(
        &self,
        label: &str,
        prompt: String,
        grounded: bool,
    ) -> Result<T, StudioError> {
        let mut generation_config = json!({ "temperature": 0.8 });
        let tools = if grounded {
            Some(vec![json!({ "google_search": {} })])
        } else {
            generation_config["responseMimeType"] = json!("application/json");
            None
        };

        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::Text { text: prompt }])],
            tools,
            generation_config: Some(generation_config),
        };

        let response = self.generate_content(label, &self.text_model, &request).await?;
        let text = response_text(&response)
            .ok_or_else(|| StudioError::MalformedResponse(format!("{} response contained no text", label)))?;

        serde_json::from_str(extract_json_block(&text)).map_err(|e| {
            tracing::warn!("Gemini {} returned unparseable JSON: {} | {}", label, e, truncate(&text));
            StudioError::MalformedResponse(format!("{} JSON: {}", label, e))
        })
    }

    async fn generate_image(
        &self,
        label: &str,
        prompt: String,
        reference: Option<&BinaryRef>,
    ) -> Result<BinaryRef, StudioError> {
        let mut parts = Vec::new();
        if let Some(reference) = reference {
            let (mime_type, bytes) = self.load_bytes(reference).await?;
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type,
                    data: BASE64_STANDARD.encode(bytes),
                },
            });
        }
        parts.push(Part::Text { text: prompt });

        let request = GenerateContentRequest {
            contents: vec![Content::user(parts)],
            tools: None,
            generation_config: Some(json!({
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": SHORTS_ASPECT_RATIO }
            })),
        };

        let response = self.generate_content(label, &self.image_model, &request).await?;
        let inline = first_inline_data(&response)
            .ok_or_else(|| StudioError::MissingArtifact(label.to_string()))?;
        let bytes = decode_inline(inline)?;
        if bytes.is_empty() {
            return Err(StudioError::MissingArtifact(label.to_string()));
        }

        tracing::info!("🖼️ Generated {} ({} bytes)", label, bytes.len());
        Ok(BinaryRef::inline(inline.mime_type.clone(), bytes))
    }

    async fn load_bytes(&self, artifact: &BinaryRef) -> Result<(String, Vec<u8>), StudioError> {
        match artifact {
            BinaryRef::Inline { mime_type, data } => Ok((mime_type.clone(), data.to_vec())),
            BinaryRef::Remote { mime_type, uri } => Ok((mime_type.clone(), self.fetch_remote(uri).await?)),
        }
    }

    fn is_service_uri(&self, uri: &str) -> bool {
        let host = |raw: &str| Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_string));
        host(uri).is_some() && host(uri) == host(&self.base_url)
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    async fn fetch_news(&self) -> Result<Vec<NewsDraft>, StudioError> {
        tracing::info!("📰 Fetching trending news");
        let prompt = format!(
            "Find the {} most important breaking news stories of the last 24 hours that would make \
             compelling 30-second vertical videos. Respond ONLY with a JSON array of objects with the \
             keys \"title\", \"snippet\" (two sentences) and \"sourceUrl\".",
            MAX_NEWS_ITEMS
        );
        self.generate_json("news", prompt, true).await
    }

    async fn generate_ideas(&self, title: &str, snippet: &str) -> Result<Vec<IdeaDraft>, StudioError> {
        tracing::info!("💡 Generating ideas for '{}'", title);
        let prompt = format!(
            "News headline: {}\nSummary: {}\n\nPropose exactly {} distinct narrative angles for a \
             30-second short-form video about this story. Respond with a JSON array of objects with \
             the keys \"title\" and \"description\".",
            title, snippet, IDEA_COUNT
        );
        self.generate_json("ideas", prompt, false).await
    }

    async fn generate_script(
        &self,
        idea_title: &str,
        idea_description: &str,
    ) -> Result<ScriptDraft, StudioError> {
        tracing::info!("🎬 Generating script for '{}'", idea_title);
        let prompt = format!(
            "Write a 30-second vertical video script for the angle \"{}\": {}\n\n\
             Respond with a JSON object with the keys \"title\", \"description\", \"tags\" (exactly {} \
             strings), \"callToAction\", \"thumbnailPrompt\", \"mainReferencePrompt\" (a visual style \
             description shared by every scene), \"fullNarrationText\" and \"segments\": exactly {} objects, \
             each covering 3 seconds, with the keys \"timeOffset\" (e.g. \"0-3s\"), \"narrationText\" and \
             \"imagePrompt\".",
            idea_title, idea_description, MAX_TAGS, SEGMENT_COUNT
        );
        self.generate_json("script", prompt, false).await
    }

    async fn generate_reference_variants(&self, prompt: &str) -> Result<Vec<BinaryRef>, StudioError> {
        tracing::info!("🎨 Generating {} reference variants", REFERENCE_VARIANT_COUNT);
        let calls = (1..=REFERENCE_VARIANT_COUNT).map(|n| {
            self.generate_image(
                "reference variant",
                format!(
                    "Character and style reference sheet, variant {} of {}. {}",
                    n, REFERENCE_VARIANT_COUNT, prompt
                ),
                None,
            )
        });
        futures::future::try_join_all(calls).await
    }

    async fn generate_reference_variant(&self, prompt: &str) -> Result<BinaryRef, StudioError> {
        self.generate_image(
            "reference variant",
            format!("Character and style reference sheet, alternate take. {}", prompt),
            None,
        )
        .await
    }

    async fn generate_thumbnail(&self, prompt: &str) -> Result<BinaryRef, StudioError> {
        self.generate_image(
            "thumbnail",
            format!("Eye-catching vertical video thumbnail, no small text. {}", prompt),
            None,
        )
        .await
    }

    async fn generate_narration(&self, full_narration_text: &str) -> Result<BinaryRef, StudioError> {
        tracing::info!("🎵 Generating narration with voice {}", self.voice);
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::Text {
                text: full_narration_text.to_string(),
            }])],
            tools: None,
            generation_config: Some(json!({
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            })),
        };

        let response = self.generate_content("narration", &self.tts_model, &request).await?;
        let inline = first_inline_data(&response)
            .ok_or_else(|| StudioError::MissingArtifact("narration audio".to_string()))?;
        let audio = decode_inline(inline)?;
        if audio.is_empty() {
            return Err(StudioError::MissingArtifact("narration audio".to_string()));
        }

        let mime = inline.mime_type.to_ascii_lowercase();
        if mime.starts_with("audio/l16") || mime.starts_with("audio/pcm") {
            let rate = sample_rate_from_mime(&mime).unwrap_or(TTS_SAMPLE_RATE);
            let wav = pcm_to_wav(&audio, rate, TTS_CHANNELS, TTS_BITS_PER_SAMPLE);
            tracing::info!("✅ Generated {} bytes of narration audio", wav.len());
            return Ok(BinaryRef::inline("audio/wav", wav));
        }
        Ok(BinaryRef::inline(inline.mime_type.clone(), audio))
    }

    async fn generate_scene_image(
        &self,
        reference: &BinaryRef,
        prompt: &str,
    ) -> Result<BinaryRef, StudioError> {
        self.generate_image(
            "scene image",
            format!(
                "Using the attached image as the style and character reference, create a vertical \
                 frame for this scene: {}",
                prompt
            ),
            Some(reference),
        )
        .await
    }

    async fn start_scene_motion(
        &self,
        scene_image: &BinaryRef,
        prompt: &str,
    ) -> Result<MotionJob, StudioError> {
        let key = self.key()?;
        let (mime_type, bytes) = self.load_bytes(scene_image).await?;
        let body = json!({
            "instances": [{
                "prompt": prompt,
                "image": {
                    "bytesBase64Encoded": BASE64_STANDARD.encode(bytes),
                    "mimeType": mime_type
                }
            }],
            "parameters": { "aspectRatio": SHORTS_ASPECT_RATIO }
        });

        let url = self.model_url(&self.video_model, "predictLongRunning");
        let raw = self
            .send_json("motion", || self.client.post(&url).query(&[("key", key)]).json(&body))
            .await?;

        let name = raw["name"]
            .as_str()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StudioError::MalformedResponse("motion job has no operation name".to_string()))?;

        tracing::info!("🎞️ Started motion job {}", name);
        Ok(MotionJob { name: name.to_string() })
    }

    async fn poll_scene_motion(&self, job: &MotionJob) -> Result<MotionStatus, StudioError> {
        let key = self.key()?;
        let url = format!("{}/{}", self.base_url, job.name);
        let raw = self
            .send_json("motion poll", || self.client.get(&url).query(&[("key", key)]))
            .await?;
        parse_operation(&raw)
    }
}

#[async_trait]
impl ArtifactFetcher for GeminiGateway {
    async fn fetch_remote(&self, uri: &str) -> Result<Vec<u8>, StudioError> {
        let mut request = self.client.get(uri);
        // Service-hosted files (Veo downloads) need the key; foreign URLs must not see it.
        if self.is_service_uri(uri) {
            request = request.header("x-goog-api-key", self.key()?);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(StudioError::FetchFailure(format!("download of {} failed ({})", uri, status)));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ============================================================================
// RESPONSE HELPERS
// ============================================================================

fn truncate(text: &str) -> &str {
    let mut end = text.len().min(500);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Concatenated text parts of the first candidate.
pub fn response_text(response: &GenerateContentResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn first_inline_data(response: &GenerateContentResponse) -> Option<&InlineData> {
    response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .find_map(|part| match part {
            Part::InlineData { inline_data } if !inline_data.data.is_empty() => Some(inline_data),
            _ => None,
        })
}

fn decode_inline(inline: &InlineData) -> Result<Vec<u8>, StudioError> {
    BASE64_STANDARD
        .decode(&inline.data)
        .map_err(|e| StudioError::MalformedResponse(format!("invalid base64 payload: {}", e)))
}

/// The JSON document inside a model answer: a fenced block when present,
/// otherwise the span from the first opening to the last closing bracket.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(inner) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str();
    }

    let start = text.find(|c| c == '[' || c == '{');
    let end = text.rfind(|c| c == ']' || c == '}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text.trim(),
    }
}

/// Interpret a long-running operation resource.
pub fn parse_operation(raw: &Value) -> Result<MotionStatus, StudioError> {
    if let Some(error) = raw.get("error") {
        let message = error["message"].as_str().unwrap_or("motion job failed");
        return Ok(MotionStatus::Failed(message.to_string()));
    }

    if !raw["done"].as_bool().unwrap_or(false) {
        return Ok(MotionStatus::Running);
    }

    let video_response = &raw["response"]["generateVideoResponse"];
    if let Some(uri) = video_response["generatedSamples"][0]["video"]["uri"].as_str() {
        return Ok(MotionStatus::Completed(BinaryRef::remote("video/mp4", uri)));
    }

    if let Some(reasons) = video_response["raiMediaFilteredReasons"].as_array() {
        let joined: Vec<&str> = reasons.iter().filter_map(Value::as_str).collect();
        if !joined.is_empty() {
            return Ok(MotionStatus::Failed(format!("filtered: {}", joined.join("; "))));
        }
    }

    Err(StudioError::MissingArtifact("motion clip".to_string()))
}
