//! Stage Artifacts
//!
//! Each pipeline stage persists exactly one JSON artifact per video under
//! `{library}/.scenedex/index/{video_id}/`. Artifacts are the sole record of
//! pipeline progress: resumability is decided entirely from which artifact
//! files exist on disk, never from in-memory state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::fs::{atomic_write_json_pretty, validate_path_id_component};
use crate::core::library::STATE_DIR_NAME;
use crate::core::scenes::{AspectRatio, DominantColor, Scene, ShotType};
use crate::core::{CoreError, CoreResult, SceneId, TimeSec, VideoId};

/// Name of the index directory under the state directory
pub const INDEX_DIR_NAME: &str = "index";

// =============================================================================
// Stages
// =============================================================================

/// Pipeline stage, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Transcript,
    FrameAnalysis,
    Scenes,
    Embeddings,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 4] = [
        Stage::Transcript,
        Stage::FrameAnalysis,
        Stage::Scenes,
        Stage::Embeddings,
    ];

    /// Artifact file name for this stage
    pub fn file_name(&self) -> &'static str {
        match self {
            Stage::Transcript => "transcript.json",
            Stage::FrameAnalysis => "frame_analysis.json",
            Stage::Scenes => "scenes.json",
            Stage::Embeddings => "embeddings.json",
        }
    }

    /// Short label for logs and error messages
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Transcript => "transcript",
            Stage::FrameAnalysis => "frameAnalysis",
            Stage::Scenes => "scenes",
            Stage::Embeddings => "embeddings",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Artifact Payloads
// =============================================================================

/// A transcribed speech segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
    pub text: String,
    /// Recognizer confidence in [0, 1]
    pub confidence: f32,
}

/// Output of the transcription stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptArtifact {
    pub video_id: VideoId,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    /// Provider that produced this artifact (e.g. "whisper-large-v3")
    pub generator: String,
    pub segments: Vec<TranscriptSegment>,
}

/// A visually homogeneous segment from frame analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSegment {
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
    pub description: String,
    pub shot_type: ShotType,
    pub aspect_ratio: AspectRatio,
    pub camera: String,
    pub dominant_color: DominantColor,
    pub objects: Vec<String>,
    pub detected_text: Vec<String>,
}

/// A face identity reference anchored at a timestamp, recorded during frame
/// analysis so scene building can resume in a later run without re-detecting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFaceRef {
    /// Resolved name, or face id if the identity is still unknown
    pub identity_ref: String,
    pub timestamp_sec: TimeSec,
    pub emotion: Option<String>,
}

/// Output of the frame analysis stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnalysisArtifact {
    pub video_id: VideoId,
    pub created_at: String,
    pub generator: String,
    /// Video-level content category (e.g. "travel", "interview")
    pub category: String,
    pub segments: Vec<FrameSegment>,
    pub face_refs: Vec<SceneFaceRef>,
}

/// Output of the scene building stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenesArtifact {
    pub video_id: VideoId,
    pub created_at: String,
    pub generator: String,
    pub scenes: Vec<Scene>,
}

/// Output of the embedding stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingsArtifact {
    pub video_id: VideoId,
    pub created_at: String,
    pub generator: String,
    /// Vector dimension; all vectors in the artifact have this length
    pub dimension: usize,
    pub vectors: BTreeMap<SceneId, Vec<f32>>,
}

// =============================================================================
// Artifact Store
// =============================================================================

/// Reads and writes per-video stage artifacts
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    index_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `{library_root}/.scenedex/index`
    pub fn new(library_root: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: library_root.into().join(STATE_DIR_NAME).join(INDEX_DIR_NAME),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Directory holding one video's artifacts
    pub fn video_dir(&self, video_id: &str) -> CoreResult<PathBuf> {
        validate_path_id_component(video_id, "videoId")?;
        Ok(self.index_dir.join(video_id))
    }

    /// Path of one stage artifact for a video
    pub fn artifact_path(&self, video_id: &str, stage: Stage) -> CoreResult<PathBuf> {
        Ok(self.video_dir(video_id)?.join(stage.file_name()))
    }

    /// Whether a stage artifact exists on disk
    pub fn exists(&self, video_id: &str, stage: Stage) -> CoreResult<bool> {
        Ok(self.artifact_path(video_id, stage)?.is_file())
    }

    /// Persists an artifact atomically (write temp, fsync, rename)
    pub fn save<T: Serialize>(&self, video_id: &str, stage: Stage, artifact: &T) -> CoreResult<()> {
        let path = self.artifact_path(video_id, stage)?;
        atomic_write_json_pretty(&path, artifact)?;
        debug!(video_id, stage = %stage, "saved stage artifact");
        Ok(())
    }

    /// Loads an artifact if present.
    ///
    /// Returns `Ok(None)` when the file does not exist; a file that exists but
    /// fails to parse is reported as `ArtifactCorrupted`.
    pub fn load<T: DeserializeOwned>(
        &self,
        video_id: &str,
        stage: Stage,
    ) -> CoreResult<Option<T>> {
        let path = self.artifact_path(video_id, stage)?;
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        match serde_json::from_slice(&bytes) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => Err(CoreError::ArtifactCorrupted {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Removes a stage artifact; missing files are not an error
    pub fn delete(&self, video_id: &str, stage: Stage) -> CoreResult<()> {
        let path = self.artifact_path(video_id, stage)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::IoError(e)),
        }
    }

    /// Lists video ids that have at least one artifact directory
    pub fn list_indexed(&self) -> CoreResult<Vec<VideoId>> {
        if !self.index_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.index_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// =============================================================================
// Resume Resolution
// =============================================================================

/// Where to resume a video's pipeline
#[derive(Clone, Debug, PartialEq)]
pub struct ResumePoint {
    /// Longest prefix of stages whose artifacts exist
    pub completed: Vec<Stage>,
    /// Artifacts that exist after a gap; their inputs may have changed
    pub stale: Vec<Stage>,
    /// First stage to run, `None` when all stages are complete
    pub next: Option<Stage>,
}

impl ResumePoint {
    pub fn is_complete(&self) -> bool {
        self.next.is_none()
    }
}

/// Computes resume points from artifact presence alone
#[derive(Clone, Debug)]
pub struct StageResolver {
    store: ArtifactStore,
}

impl StageResolver {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Resolves the resume point for one video.
    ///
    /// Completed stages are the longest prefix of [`Stage::ALL`] with an
    /// artifact on disk. The first missing stage is `next`. Any artifact
    /// present after that gap is stale: it was produced from inputs that no
    /// longer exist and must be regenerated.
    pub fn resolve(&self, video_id: &str) -> CoreResult<ResumePoint> {
        let mut completed = Vec::new();
        let mut stale = Vec::new();
        let mut next = None;

        for stage in Stage::ALL {
            let present = self.store.exists(video_id, stage)?;
            if next.is_none() {
                if present {
                    completed.push(stage);
                } else {
                    next = Some(stage);
                }
            } else if present {
                stale.push(stage);
            }
        }

        Ok(ResumePoint {
            completed,
            stale,
            next,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::new(dir.path())
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let artifact = transcript_artifact("vid_a1b2c3d4", vec![segment(0.0, 2.0, "hello")]);

        store.save("vid_a1b2c3d4", Stage::Transcript, &artifact).unwrap();
        let loaded: TranscriptArtifact = store
            .load("vid_a1b2c3d4", Stage::Transcript)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<TranscriptArtifact> =
            store(&dir).load("vid_a1b2c3d4", Stage::Transcript).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_corrupted_reports_path() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.artifact_path("vid_a1b2c3d4", Stage::Scenes).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ truncated").unwrap();

        let result: CoreResult<Option<ScenesArtifact>> = store.load("vid_a1b2c3d4", Stage::Scenes);
        match result {
            Err(CoreError::ArtifactCorrupted { path: p, .. }) => {
                assert!(p.contains("scenes.json"));
            }
            other => panic!("expected ArtifactCorrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_store_rejects_traversal_video_id() {
        let dir = TempDir::new().unwrap();
        let result = store(&dir).artifact_path("../evil", Stage::Transcript);
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn test_resolver_fresh_video_starts_at_transcript() {
        let dir = TempDir::new().unwrap();
        let resolver = StageResolver::new(store(&dir));
        let point = resolver.resolve("vid_a1b2c3d4").unwrap();
        assert!(point.completed.is_empty());
        assert!(point.stale.is_empty());
        assert_eq!(point.next, Some(Stage::Transcript));
    }

    #[test]
    fn test_resolver_resumes_after_prefix() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let artifact = transcript_artifact("vid_a1b2c3d4", vec![]);
        store.save("vid_a1b2c3d4", Stage::Transcript, &artifact).unwrap();

        let point = StageResolver::new(store).resolve("vid_a1b2c3d4").unwrap();
        assert_eq!(point.completed, vec![Stage::Transcript]);
        assert_eq!(point.next, Some(Stage::FrameAnalysis));
        assert!(!point.is_complete());
    }

    #[test]
    fn test_resolver_marks_artifacts_after_gap_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let artifact = transcript_artifact("vid_a1b2c3d4", vec![]);
        store.save("vid_a1b2c3d4", Stage::Transcript, &artifact).unwrap();
        // Scenes exists but frame analysis is missing: scenes is stale.
        let scenes = ScenesArtifact {
            video_id: "vid_a1b2c3d4".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: "test".to_string(),
            scenes: vec![],
        };
        store.save("vid_a1b2c3d4", Stage::Scenes, &scenes).unwrap();

        let point = StageResolver::new(store).resolve("vid_a1b2c3d4").unwrap();
        assert_eq!(point.completed, vec![Stage::Transcript]);
        assert_eq!(point.next, Some(Stage::FrameAnalysis));
        assert_eq!(point.stale, vec![Stage::Scenes]);
    }

    #[test]
    fn test_resolver_complete_video() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for stage in Stage::ALL {
            let path = store.artifact_path("vid_a1b2c3d4", stage).unwrap();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"{}").unwrap();
        }

        let point = StageResolver::new(store).resolve("vid_a1b2c3d4").unwrap();
        assert!(point.is_complete());
        assert_eq!(point.completed.len(), 4);
        assert!(point.stale.is_empty());
    }

    #[test]
    fn test_list_indexed_sorted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let artifact = transcript_artifact("vid_b", vec![]);
        store.save("vid_b", Stage::Transcript, &artifact).unwrap();
        store.save("vid_a", Stage::Transcript, &artifact).unwrap();

        assert_eq!(store.list_indexed().unwrap(), vec!["vid_a", "vid_b"]);
    }
}
