//! Analysis Provider Traits
//!
//! The pipeline never talks to a model directly. Each stage consumes a
//! provider trait so transcription, frame analysis, embedding, and query
//! parsing backends can be swapped without touching orchestration. Tests use
//! deterministic in-process providers.

use std::path::Path;

use async_trait::async_trait;

use crate::core::artifacts::{FrameSegment, TranscriptSegment};
use crate::core::faces::FaceObservation;
use crate::core::search::SceneQuery;
use crate::core::CoreResult;

// =============================================================================
// Progress Reporting
// =============================================================================

/// A progress snapshot emitted by a provider mid-stage
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageProgress {
    /// Completion in [0, 100]
    pub percent: f32,
    /// Seconds elapsed since the stage started
    pub elapsed_sec: f64,
    /// Frames processed so far, when the provider counts frames
    pub frames_processed: Option<u64>,
    pub total_frames: Option<u64>,
}

impl StageProgress {
    pub fn at_percent(percent: f32, elapsed_sec: f64) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0),
            elapsed_sec,
            frames_processed: None,
            total_frames: None,
        }
    }
}

/// Callback invoked by providers as a stage progresses
pub type ProgressFn = Box<dyn Fn(StageProgress) + Send + Sync>;

// =============================================================================
// Stage Providers
// =============================================================================

/// Produces speech transcript segments for a video file
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn transcribe(
        &self,
        video_path: &Path,
        on_progress: ProgressFn,
    ) -> CoreResult<Vec<TranscriptSegment>>;
}

/// Full output of visual analysis for one video
#[derive(Clone, Debug, PartialEq)]
pub struct FrameAnalysis {
    /// Video-level content category
    pub category: String,
    /// Visually homogeneous segments covering the video
    pub segments: Vec<FrameSegment>,
    /// Faces detected during analysis, with crops and embeddings
    pub faces: Vec<FaceObservation>,
}

/// Analyzes sampled frames: segments, descriptions, objects, faces
#[async_trait]
pub trait FrameAnalysisProvider: Send + Sync {
    async fn analyze(&self, video_path: &Path, on_progress: ProgressFn)
        -> CoreResult<FrameAnalysis>;
}

/// Embeds text into fixed-dimension vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Vector dimension every embedding from this provider has
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    /// Embeds a batch of texts; the default embeds sequentially
    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Parses a free-text prompt into a structured scene query
#[async_trait]
pub trait QueryParserProvider: Send + Sync {
    async fn parse_prompt(&self, prompt: &str) -> CoreResult<SceneQuery>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progress_clamps_percent() {
        assert_eq!(StageProgress::at_percent(150.0, 1.0).percent, 100.0);
        assert_eq!(StageProgress::at_percent(-5.0, 1.0).percent, 0.0);
    }
}
