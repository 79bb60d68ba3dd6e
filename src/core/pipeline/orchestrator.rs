//! Indexing Orchestrator
//!
//! Runs the four-stage pipeline for each video in a library. Every stage
//! persists its artifact before the next begins, so a crashed or cancelled
//! run resumes at the first missing artifact. One video failing never stops
//! the rest of the batch.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::core::artifacts::{
    ArtifactStore, EmbeddingsArtifact, FrameAnalysisArtifact, SceneFaceRef, ScenesArtifact, Stage,
    StageResolver, TranscriptArtifact,
};
use crate::core::faces::FaceStore;
use crate::core::library::{LibraryScanner, VideoSource};
use crate::core::providers::{
    EmbeddingProvider, FrameAnalysisProvider, ProgressFn, TranscriptionProvider,
};
use crate::core::{CoreError, CoreResult, VideoId};

use super::builder::build_scenes;
use super::{ProgressEvent, ProgressSink};

fn generator() -> String {
    format!("scenedex-{}", env!("CARGO_PKG_VERSION"))
}

// =============================================================================
// Outcome
// =============================================================================

/// Terminal state of one video's indexing run
#[derive(Clone, Debug, PartialEq)]
pub enum VideoOutcome {
    /// At least one stage ran and the video is now fully indexed
    Completed,
    /// Every artifact already existed; nothing ran
    AlreadyComplete,
    /// A stage failed; earlier artifacts are kept for resume
    Failed { stage: Stage, message: String },
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives videos through the indexing pipeline
pub struct IndexingOrchestrator {
    artifacts: ArtifactStore,
    resolver: StageResolver,
    faces: FaceStore,
    transcriber: Arc<dyn TranscriptionProvider>,
    analyzer: Arc<dyn FrameAnalysisProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    progress: ProgressSink,
}

impl IndexingOrchestrator {
    pub fn new(
        library_root: impl AsRef<Path>,
        transcriber: Arc<dyn TranscriptionProvider>,
        analyzer: Arc<dyn FrameAnalysisProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let root = library_root.as_ref().to_path_buf();
        let artifacts = ArtifactStore::new(&root);
        Self {
            resolver: StageResolver::new(artifacts.clone()),
            faces: FaceStore::new(&root),
            artifacts,
            transcriber,
            analyzer,
            embedder,
            progress: ProgressSink::null(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn face_store(&self) -> &FaceStore {
        &self.faces
    }

    /// Scans a folder and indexes everything found in it.
    pub async fn index_folder(&self, folder: &Path) -> CoreResult<Vec<(VideoId, VideoOutcome)>> {
        let sources = LibraryScanner::new(folder).scan()?;
        Ok(self.index_library(&sources).await)
    }

    /// Indexes a batch of videos. A failing video is recorded and the batch
    /// continues.
    pub async fn index_library(&self, sources: &[VideoSource]) -> Vec<(VideoId, VideoOutcome)> {
        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            let outcome = match self.index_video(source).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(video_id = %source.id, error = %e, "indexing failed before any stage");
                    VideoOutcome::Failed {
                        stage: Stage::Transcript,
                        message: e.to_string(),
                    }
                }
            };
            if let VideoOutcome::Failed { stage, message } = &outcome {
                warn!(video_id = %source.id, stage = %stage, message, "video indexing failed");
            }
            outcomes.push((source.id.clone(), outcome));
        }
        outcomes
    }

    /// Indexes one video, resuming from its persisted artifacts.
    pub async fn index_video(&self, source: &VideoSource) -> CoreResult<VideoOutcome> {
        let resume = self.resolver.resolve(&source.id)?;

        // Artifacts after a gap were produced from inputs that no longer
        // exist; remove them before running.
        for stage in &resume.stale {
            self.artifacts.delete(&source.id, *stage)?;
        }

        let Some(first) = resume.next else {
            // Replay terminal events so observers see a consistent stream.
            for stage in Stage::ALL {
                self.progress
                    .emit(ProgressEvent::completed(&source.id, stage, 0.0));
            }
            return Ok(VideoOutcome::AlreadyComplete);
        };

        info!(
            video_id = %source.id,
            resume_at = %first,
            completed = resume.completed.len(),
            "indexing video"
        );

        for stage in Stage::ALL {
            if resume.completed.contains(&stage) {
                continue;
            }
            let started = Instant::now();
            let result = match stage {
                Stage::Transcript => self.run_transcript(source).await,
                Stage::FrameAnalysis => self.run_frame_analysis(source).await,
                Stage::Scenes => self.run_scene_building(source).await,
                Stage::Embeddings => self.run_embedding(source).await,
            };
            let elapsed = started.elapsed().as_secs_f64();
            match result {
                Ok(()) => {
                    self.progress
                        .emit(ProgressEvent::completed(&source.id, stage, elapsed));
                }
                Err(e) => {
                    self.progress
                        .emit(ProgressEvent::failed(&source.id, stage, elapsed));
                    return Ok(VideoOutcome::Failed {
                        stage,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(VideoOutcome::Completed)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    fn progress_relay(&self, video_id: &str, stage: Stage) -> ProgressFn {
        let sink = self.progress.clone();
        let video_id = video_id.to_string();
        Box::new(move |p| {
            sink.emit(ProgressEvent::progress(
                &video_id,
                stage,
                p.percent,
                p.elapsed_sec,
            ));
        })
    }

    async fn run_transcript(&self, source: &VideoSource) -> CoreResult<()> {
        let segments = self
            .transcriber
            .transcribe(
                &source.path,
                self.progress_relay(&source.id, Stage::Transcript),
            )
            .await
            .map_err(|e| stage_failed(&source.id, Stage::Transcript, e))?;

        let artifact = TranscriptArtifact {
            video_id: source.id.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: generator(),
            segments,
        };
        self.artifacts.save(&source.id, Stage::Transcript, &artifact)
    }

    async fn run_frame_analysis(&self, source: &VideoSource) -> CoreResult<()> {
        let analysis = self
            .analyzer
            .analyze(
                &source.path,
                self.progress_relay(&source.id, Stage::FrameAnalysis),
            )
            .await
            .map_err(|e| stage_failed(&source.id, Stage::FrameAnalysis, e))?;

        // Register detections now and persist the references in the artifact,
        // so scene building can resume in a later run without re-detecting.
        let mut face_refs = Vec::with_capacity(analysis.faces.len());
        for observation in &analysis.faces {
            let face_id = self.faces.register_unknown(&source.id, observation)?;
            let identity_ref = self
                .faces
                .resolve_name(&face_id)?
                .unwrap_or(face_id);
            face_refs.push(SceneFaceRef {
                identity_ref,
                timestamp_sec: observation.timestamp_sec,
                emotion: observation.emotion.clone(),
            });
        }

        let artifact = FrameAnalysisArtifact {
            video_id: source.id.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: generator(),
            category: analysis.category,
            segments: analysis.segments,
            face_refs,
        };
        self.artifacts
            .save(&source.id, Stage::FrameAnalysis, &artifact)
    }

    async fn run_scene_building(&self, source: &VideoSource) -> CoreResult<()> {
        let transcript: TranscriptArtifact = self
            .artifacts
            .load(&source.id, Stage::Transcript)?
            .ok_or_else(|| artifact_missing(&source.id, Stage::Transcript))?;
        let analysis: FrameAnalysisArtifact = self
            .artifacts
            .load(&source.id, Stage::FrameAnalysis)?
            .ok_or_else(|| artifact_missing(&source.id, Stage::FrameAnalysis))?;

        let scenes = build_scenes(
            &source.id,
            &transcript.segments,
            &analysis.segments,
            &analysis.face_refs,
        )?;

        let artifact = ScenesArtifact {
            video_id: source.id.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: generator(),
            scenes,
        };
        self.artifacts.save(&source.id, Stage::Scenes, &artifact)
    }

    async fn run_embedding(&self, source: &VideoSource) -> CoreResult<()> {
        let scenes: ScenesArtifact = self
            .artifacts
            .load(&source.id, Stage::Scenes)?
            .ok_or_else(|| artifact_missing(&source.id, Stage::Scenes))?;

        let texts: Vec<String> = scenes
            .scenes
            .iter()
            .map(|s| {
                if s.description.trim().is_empty() {
                    s.transcription.clone()
                } else {
                    s.description.clone()
                }
            })
            .collect();

        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| stage_failed(&source.id, Stage::Embeddings, e))?;

        let dimension = self.embedder.dimension();
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(CoreError::EmbeddingDimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let artifact = EmbeddingsArtifact {
            video_id: source.id.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: generator(),
            dimension,
            vectors: scenes
                .scenes
                .iter()
                .map(|s| s.id.clone())
                .zip(vectors)
                .collect(),
        };
        self.artifacts.save(&source.id, Stage::Embeddings, &artifact)
    }
}

fn stage_failed(video_id: &str, stage: Stage, source: CoreError) -> CoreError {
    CoreError::StageFailed {
        video_id: video_id.to_string(),
        stage: stage.label(),
        message: source.to_string(),
    }
}

fn artifact_missing(video_id: &str, stage: Stage) -> CoreError {
    CoreError::ArtifactMissing {
        video_id: video_id.to_string(),
        stage: stage.label(),
    }
}
