//! Scenedex Error Definitions
//!
//! Defines error types used throughout the crate.

use thiserror::Error;

use super::{FaceId, JobId, VideoId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Library Errors
    // =========================================================================
    #[error("Video not found: {0}")]
    VideoNotFound(VideoId),

    #[error("Library scan failed: {0}")]
    LibraryScanFailed(String),

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("Stage {stage} failed for video {video_id}: {message}")]
    StageFailed {
        video_id: VideoId,
        stage: &'static str,
        message: String,
    },

    #[error("Missing {stage} artifact for video {video_id}")]
    ArtifactMissing {
        video_id: VideoId,
        stage: &'static str,
    },

    #[error("Artifact corrupted at {path}: {message}")]
    ArtifactCorrupted { path: String, message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    // =========================================================================
    // Search Errors
    // =========================================================================
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // =========================================================================
    // Face Store Errors
    // =========================================================================
    #[error("Unknown face not found: {0}")]
    UnknownFaceNotFound(FaceId),

    #[error("Known face not found: {0}")]
    KnownFaceNotFound(String),

    // =========================================================================
    // Job Queue Errors
    // =========================================================================
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job queue corrupted: {0}")]
    QueueCorrupted(String),

    #[error("No handler registered for job family: {0}")]
    UnknownJobFamily(String),

    // =========================================================================
    // Locking Errors
    // =========================================================================
    #[error("Failed to acquire lock for {path}: {message}")]
    LockFailed { path: String, message: String },

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;
