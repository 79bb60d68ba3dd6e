//! Indexing Pipeline
//!
//! Drives each video through transcription, frame analysis, scene building,
//! and embedding, resuming from persisted stage artifacts. Progress flows to
//! observers through an unbounded channel; a closed receiver never stalls the
//! pipeline.

pub mod builder;
pub mod orchestrator;

pub use orchestrator::{IndexingOrchestrator, VideoOutcome};

use tokio::sync::mpsc;

use crate::core::artifacts::Stage;
use crate::core::VideoId;

// =============================================================================
// Progress Events
// =============================================================================

/// A progress update for one video's stage
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub video_id: VideoId,
    pub stage: Stage,
    /// Completion in [0, 100]
    pub percent: f32,
    /// Set on terminal events: `Some(true)` on completion, `Some(false)` on
    /// failure
    pub success: Option<bool>,
    /// Optional preview thumbnail path
    pub thumbnail: Option<String>,
    pub elapsed_sec: f64,
}

impl ProgressEvent {
    pub fn progress(video_id: &str, stage: Stage, percent: f32, elapsed_sec: f64) -> Self {
        Self {
            video_id: video_id.to_string(),
            stage,
            percent: percent.clamp(0.0, 100.0),
            success: None,
            thumbnail: None,
            elapsed_sec,
        }
    }

    pub fn completed(video_id: &str, stage: Stage, elapsed_sec: f64) -> Self {
        Self {
            video_id: video_id.to_string(),
            stage,
            percent: 100.0,
            success: Some(true),
            thumbnail: None,
            elapsed_sec,
        }
    }

    pub fn failed(video_id: &str, stage: Stage, elapsed_sec: f64) -> Self {
        Self {
            video_id: video_id.to_string(),
            stage,
            percent: 0.0,
            success: Some(false),
            thumbnail: None,
            elapsed_sec,
        }
    }
}

// =============================================================================
// Progress Sink
// =============================================================================

/// Fan-out handle for progress events
#[derive(Clone, Debug)]
pub struct ProgressSink {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// Creates a sink and its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that discards every event
    pub fn null() -> Self {
        Self { sender: None }
    }

    /// Emits an event. A dropped receiver is ignored.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
