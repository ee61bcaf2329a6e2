// src/config.rs
//! Runtime configuration, read from the environment (after `dotenvy` has loaded `.env`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// The single credential gating every gateway call.
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub video_model: String,
    pub voice: String,
    pub motion_poll_interval: Duration,
    pub motion_max_polls: u32,
    /// Scene images generated at once. 1 keeps scenes strictly ordered.
    pub scene_concurrency: usize,
    /// Upper bound for transport-level retries of a single gateway request.
    pub gateway_retry_window: Duration,
    /// Caller has confirmed billing readiness for motion generation.
    pub motion_enabled: bool,
    pub output_dir: PathBuf,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            voice: "Kore".to_string(),
            motion_poll_interval: Duration::from_secs(10),
            motion_max_polls: 60,
            scene_concurrency: 1,
            gateway_retry_window: Duration::from_secs(60),
            motion_enabled: false,
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: env_string("GEMINI_BASE_URL", defaults.base_url),
            text_model: env_string("STUDIO_TEXT_MODEL", defaults.text_model),
            image_model: env_string("STUDIO_IMAGE_MODEL", defaults.image_model),
            tts_model: env_string("STUDIO_TTS_MODEL", defaults.tts_model),
            video_model: env_string("STUDIO_VIDEO_MODEL", defaults.video_model),
            voice: env_string("STUDIO_VOICE", defaults.voice),
            motion_poll_interval: Duration::from_secs(env_parse(
                "STUDIO_MOTION_POLL_SECS",
                defaults.motion_poll_interval.as_secs(),
            )),
            motion_max_polls: env_parse("STUDIO_MOTION_MAX_POLLS", defaults.motion_max_polls),
            scene_concurrency: env_parse("STUDIO_SCENE_CONCURRENCY", defaults.scene_concurrency).max(1),
            gateway_retry_window: Duration::from_secs(env_parse(
                "STUDIO_GATEWAY_RETRY_SECS",
                defaults.gateway_retry_window.as_secs(),
            )),
            motion_enabled: env_parse("STUDIO_MOTION_ENABLED", defaults.motion_enabled),
            output_dir: std::env::var("STUDIO_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("⚠️ Ignoring invalid value for {}: '{}' (using {:?})", key, raw, default);
            default
        }
    }
}
