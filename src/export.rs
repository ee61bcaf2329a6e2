// src/export.rs
//! BundleAssembler - packs every successful artifact into one zip archive.
//!
//! All bytes are resolved before the archive is opened: if an artifact that
//! is marked successful cannot be fetched, no archive is produced at all.
//! Missing, failed or pending artifacts are simply left out.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{StudioError, StudioResult};
use crate::gateway::ArtifactFetcher;
use crate::models::{BinaryRef, ScriptPackage};

pub const MANIFEST_FILE: &str = "production_metadata.json";
pub const SCRIPT_FILE: &str = "full_script.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSegment {
    pub index: usize,
    pub time_offset: String,
    pub start_seconds: u32,
    pub narration_text: String,
    /// Archive path of the segment's artifact, if it made it into the bundle.
    pub artifact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub script: String,
    pub call_to_action: String,
    pub segment_count: usize,
    pub segments: Vec<ManifestSegment>,
    /// Archive entries in write order (manifest and script text excluded).
    pub artifacts: Vec<String>,
    pub generated_at: String,
}

#[derive(Debug)]
pub struct Bundle {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub manifest: BundleManifest,
}

impl Bundle {
    pub async fn write_to(&self, dir: &Path) -> StudioResult<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!("📦 Bundle written to {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Title with path-hostile characters dropped and whitespace runs collapsed to `_`.
pub fn bundle_file_name(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '-' | '.'))
        .collect();
    let stem = kept.split_whitespace().collect::<Vec<_>>().join("_");
    let stem = stem.trim_matches('.');

    if stem.is_empty() {
        "production.zip".to_string()
    } else {
        format!("{}.zip", stem)
    }
}

/// Positional, zero-padded and 1-based so entries sort in playback order.
fn scene_entry(index: usize, kind: &str, artifact: &BinaryRef) -> String {
    format!("scenes/segment_{:02}_{}.{}", index + 1, kind, artifact.extension())
}

struct PlannedEntry<'a> {
    path: String,
    artifact: &'a BinaryRef,
}

fn plan_entries(package: &ScriptPackage) -> Vec<PlannedEntry<'_>> {
    let mut entries = Vec::new();

    if let Some(narration) = package.narration_value() {
        entries.push(PlannedEntry {
            path: format!("narration.{}", narration.extension()),
            artifact: narration,
        });
    }
    if let Some(thumbnail) = package.thumbnail_value() {
        entries.push(PlannedEntry {
            path: format!("thumbnail.{}", thumbnail.extension()),
            artifact: thumbnail,
        });
    }
    for segment in &package.segments {
        let planned = match (segment.motion_value(), segment.image_value()) {
            (Some(clip), _) => Some(("motion", clip)),
            (None, Some(frame)) => Some(("frame", frame)),
            (None, None) => None,
        };
        if let Some((kind, artifact)) = planned {
            entries.push(PlannedEntry {
                path: scene_entry(segment.index, kind, artifact),
                artifact,
            });
        }
    }

    entries
}

pub fn build_manifest(package: &ScriptPackage) -> BundleManifest {
    let entries = plan_entries(package);
    let artifact_for = |index: usize| {
        let prefix = format!("scenes/segment_{:02}_", index + 1);
        entries
            .iter()
            .find(|e| e.path.starts_with(&prefix))
            .map(|e| e.path.clone())
    };

    BundleManifest {
        title: package.title.clone(),
        description: package.description.clone(),
        tags: package.tags.clone(),
        script: package.full_narration_text.clone(),
        call_to_action: package.call_to_action.clone(),
        segment_count: package.segments.len(),
        segments: package
            .segments
            .iter()
            .map(|s| ManifestSegment {
                index: s.index,
                time_offset: s.time_offset.clone(),
                start_seconds: s.start_seconds(),
                narration_text: s.narration_text.clone(),
                artifact: artifact_for(s.index),
            })
            .collect(),
        artifacts: entries.iter().map(|e| e.path.clone()).collect(),
        generated_at: Utc::now().to_rfc3339(),
    }
}

pub struct BundleAssembler {
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl BundleAssembler {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self { fetcher }
    }

    async fn resolve(&self, path: &str, artifact: &BinaryRef) -> StudioResult<Vec<u8>> {
        match artifact {
            BinaryRef::Inline { data, .. } => Ok(data.to_vec()),
            BinaryRef::Remote { uri, .. } => self.fetcher.fetch_remote(uri).await.map_err(|e| {
                tracing::error!("❌ Could not fetch {} for bundle: {}", path, e);
                StudioError::BundleAssemblyFailure(format!("{} could not be fetched: {}", path, e))
            }),
        }
    }

    pub async fn build_bundle(&self, package: &ScriptPackage) -> StudioResult<Bundle> {
        let entries = plan_entries(package);
        let manifest = build_manifest(package);

        let mut payloads = Vec::with_capacity(entries.len());
        for entry in &entries {
            payloads.push((entry.path.as_str(), self.resolve(&entry.path, entry.artifact).await?));
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for (path, bytes) in &payloads {
            zip.start_file(*path, options)?;
            zip.write_all(bytes)?;
        }

        zip.start_file(MANIFEST_FILE, options)?;
        zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

        zip.start_file(SCRIPT_FILE, options)?;
        zip.write_all(package.full_narration_text.as_bytes())?;

        let bytes = zip.finish()?.into_inner();
        let file_name = bundle_file_name(&package.title);

        tracing::info!(
            "📦 Bundled '{}': {} artifacts, {} bytes",
            package.title,
            payloads.len(),
            bytes.len()
        );
        Ok(Bundle {
            file_name,
            bytes,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{
        segment_prompt, studio_at_reference_selection, studio_in_production, MemoryFetcher, ScriptedGateway,
    };
    use crate::workflow::ReferenceChoice;
    use std::io::Read;

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        archive.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[test]
    fn test_bundle_file_name() {
        assert_eq!(bundle_file_name("Rates Cut  Again"), "Rates_Cut_Again.zip");
        assert_eq!(bundle_file_name("  AI / Jobs: what next? "), "AI_Jobs_what_next.zip");
        assert_eq!(bundle_file_name("Rates - Cut"), "Rates_-_Cut.zip");
        assert_eq!(bundle_file_name("///"), "production.zip");
    }

    #[tokio::test]
    async fn test_bundle_omits_failed_scene_and_keeps_metadata() {
        let gateway = ScriptedGateway::new();
        gateway.fail_prompt(segment_prompt(6));
        let studio = studio_in_production(gateway, MemoryFetcher::new()).await;

        let bundle = studio.build_bundle().await.unwrap();
        let names = entry_names(&bundle.bytes);

        let frames: Vec<_> = names.iter().filter(|n| n.starts_with("scenes/")).collect();
        assert_eq!(frames.len(), 9);
        assert!(!names.iter().any(|n| n.starts_with("scenes/segment_07")));
        assert!(names.contains(&"scenes/segment_01_frame.png".to_string()));
        assert!(names.contains(&"narration.wav".to_string()));
        assert!(names.contains(&"thumbnail.png".to_string()));
        assert_eq!(names[names.len() - 2], MANIFEST_FILE);
        assert_eq!(names[names.len() - 1], SCRIPT_FILE);

        // Positional naming sorts in playback order.
        let scene_names: Vec<String> = frames.into_iter().cloned().collect();
        assert_eq!(sorted(scene_names.clone()), scene_names);

        let mut archive = zip::ZipArchive::new(Cursor::new(bundle.bytes.clone())).unwrap();
        let mut raw = String::new();
        archive.by_name(MANIFEST_FILE).unwrap().read_to_string(&mut raw).unwrap();
        let manifest: BundleManifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(manifest.title, "Rates Cut Again");
        assert_eq!(manifest.tags, vec!["economy", "rates", "news"]);
        assert_eq!(manifest.segment_count, 10);
        assert!(manifest.segments[6].artifact.is_none());
        assert_eq!(manifest.segments[0].start_seconds, 0);
        assert_eq!(manifest.segments[6].start_seconds, 6 * crate::models::workflow::SEGMENT_SECONDS);
        assert_eq!(manifest.script, "The central bank cut rates again today.");
        assert_eq!(bundle.file_name, "Rates_Cut_Again.zip");
    }

    #[tokio::test]
    async fn test_pending_and_failed_slots_have_no_entry() {
        let gateway = ScriptedGateway::new();
        let release_narration = gateway.gate_narration();
        gateway.fail_thumbnail(StudioError::MissingArtifact("thumbnail".into()));
        let studio = studio_at_reference_selection(gateway, MemoryFetcher::new()).await;
        let candidate = studio.snapshot().reference_candidates[0].id.clone();
        studio.select_reference(ReferenceChoice::Candidate(candidate)).unwrap();

        loop {
            let package = studio.snapshot().script_package.unwrap();
            let thumbnail_settled = package.thumbnail.as_ref().map(|t| t.is_terminal()).unwrap_or(false);
            if thumbnail_settled && package.segments.iter().all(|s| s.image_value().is_some()) {
                break;
            }
            tokio::task::yield_now().await;
        }
        let package = studio.snapshot().script_package.unwrap();
        assert!(package.narration.as_ref().unwrap().is_pending());

        let bundle = studio.build_bundle().await.unwrap();
        let names = entry_names(&bundle.bytes);
        assert!(!names.iter().any(|n| n.starts_with("narration")));
        assert!(!names.iter().any(|n| n.starts_with("thumbnail")));
        assert_eq!(names.iter().filter(|n| n.starts_with("scenes/")).count(), 10);
        assert_eq!(bundle.manifest.artifacts.len(), 10);

        release_narration.send(()).unwrap();
        studio.wait_for_production().await.unwrap();
        let names = entry_names(&studio.build_bundle().await.unwrap().bytes);
        assert!(names.contains(&"narration.wav".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("thumbnail")));
    }

    #[tokio::test]
    async fn test_motion_is_preferred_over_frame() {
        let gateway = ScriptedGateway::new();
        gateway.motion_after_polls(1);
        let fetcher = MemoryFetcher::new();
        let studio = studio_in_production(gateway, fetcher.clone()).await;
        let segment_id = studio.snapshot().script_package.unwrap().segments[0].id.clone();
        studio.animate_scene(&segment_id).await.unwrap();

        let clip_uri = match studio.snapshot().segment(&segment_id).and_then(|s| s.motion_value().cloned()) {
            Some(BinaryRef::Remote { uri, .. }) => uri,
            other => panic!("expected remote clip, got {:?}", other),
        };
        fetcher.serve(clip_uri, b"mp4-bytes".to_vec());

        let bundle = studio.build_bundle().await.unwrap();
        let names = entry_names(&bundle.bytes);
        assert!(names.contains(&"scenes/segment_01_motion.mp4".to_string()));
        assert!(!names.contains(&"scenes/segment_01_frame.png".to_string()));

        let mut archive = zip::ZipArchive::new(Cursor::new(bundle.bytes)).unwrap();
        let mut clip = Vec::new();
        archive
            .by_name("scenes/segment_01_motion.mp4")
            .unwrap()
            .read_to_end(&mut clip)
            .unwrap();
        assert_eq!(clip, b"mp4-bytes");
    }

    #[tokio::test]
    async fn test_expired_artifact_aborts_the_bundle() {
        let gateway = ScriptedGateway::new();
        gateway.motion_after_polls(1);
        let studio = studio_in_production(gateway, MemoryFetcher::new()).await;
        let segment_id = studio.snapshot().script_package.unwrap().segments[3].id.clone();
        studio.animate_scene(&segment_id).await.unwrap();

        // The clip URI was never served, i.e. it has expired.
        let err = studio.build_bundle().await.unwrap_err();
        assert!(matches!(err, StudioError::BundleAssemblyFailure(_)));
        assert!(err.interrupts_user());
    }

    #[tokio::test]
    async fn test_unchanged_aggregate_gives_identical_manifests() {
        let studio = studio_in_production(ScriptedGateway::new(), MemoryFetcher::new()).await;

        let first = studio.build_bundle().await.unwrap();
        let second = studio.build_bundle().await.unwrap();

        let strip = |m: &BundleManifest| BundleManifest {
            generated_at: String::new(),
            ..m.clone()
        };
        assert_eq!(strip(&first.manifest), strip(&second.manifest));
        assert_eq!(entry_names(&first.bytes), entry_names(&second.bytes));
    }

    #[tokio::test]
    async fn test_bundle_is_written_to_disk() {
        let studio = studio_in_production(ScriptedGateway::new(), MemoryFetcher::new()).await;
        let bundle = studio.build_bundle().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = bundle.write_to(&dir.path().join("out")).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "Rates_Cut_Again.zip");
        assert_eq!(std::fs::read(&path).unwrap(), bundle.bytes);
    }
}
