//! Face Identity Models
//!
//! Faces move through two collections: detections land in the unknown pool
//! with a crop image and an embedding, and labeling promotes them into the
//! named known set. Known identities accumulate images and aliases over time.

pub mod store;

pub use store::FaceStore;

use serde::{Deserialize, Serialize};

use crate::core::{FaceId, TimeSec, VideoId};

// =============================================================================
// Detection Types
// =============================================================================

/// Normalized face bounding box within a frame (fractions of frame size)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A single face detection produced by frame analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceObservation {
    /// Path to the saved crop image
    pub image_path: String,
    /// Timestamp of the source frame
    pub timestamp_sec: TimeSec,
    pub bounding_box: BoundingBox,
    /// Face embedding vector
    pub embedding: Vec<f32>,
    /// Context labels from the surrounding frame (e.g. "outdoors")
    pub context: Vec<String>,
    /// Content hash of the crop image, used to deduplicate re-detections
    pub crop_hash: String,
    /// Emotion label if the analyzer classified one
    pub emotion: Option<String>,
}

// =============================================================================
// Identity Records
// =============================================================================

/// A face awaiting a name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownFace {
    pub face_id: FaceId,
    pub image_path: String,
    pub video_id: VideoId,
    pub timestamp_sec: TimeSec,
    pub bounding_box: BoundingBox,
    pub embedding: Vec<f32>,
    pub context: Vec<String>,
    pub crop_hash: String,
    /// RFC 3339 detection timestamp
    pub detected_at: String,
}

/// A named identity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownFace {
    /// Canonical display name, unique within the library
    pub name: String,
    /// Crop image paths accumulated across labelings and merges
    pub images: Vec<String>,
    /// Former names and merged-away names; retained indefinitely so old
    /// references keep resolving
    pub aliases: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl KnownFace {
    /// Whether `reference` resolves to this identity by name or alias
    /// (case-insensitive)
    pub fn matches(&self, reference: &str) -> bool {
        self.name.eq_ignore_ascii_case(reference)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(reference))
    }
}

/// One page of the unknown face pool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownFacePage {
    pub faces: Vec<UnknownFace>,
    /// Zero-based page index
    pub page: usize,
    pub page_size: usize,
    /// Total unknown faces across all pages
    pub total: usize,
}
