//! Scene Query Model
//!
//! A query combines optional free text (ranked semantically) with structured
//! predicates (hard filters). Validation happens before any index is touched,
//! so a malformed query never costs an embedding call.

pub mod engine;

pub use engine::{SearchConfig, SearchEngine};

use serde::{Deserialize, Serialize};

use crate::core::scenes::{AspectRatio, Scene, ShotType};
use crate::core::{CoreError, CoreResult, TimeSec};

// =============================================================================
// Query
// =============================================================================

/// Duration constraint on matching scenes
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationHint {
    pub min_sec: Option<TimeSec>,
    pub max_sec: Option<TimeSec>,
}

/// A structured scene query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneQuery {
    /// Free text for semantic ranking
    pub text: Option<String>,
    /// Face identity references; a scene must match at least one entry
    pub faces: Vec<String>,
    /// Object labels; a scene must contain at least one entry
    pub objects: Vec<String>,
    /// Emotion filters, either a bare label ("happy") or scoped to an
    /// identity ("alice:happy")
    pub emotions: Vec<String>,
    pub shot_type: Option<ShotType>,
    pub aspect_ratio: Option<AspectRatio>,
    /// Case-insensitive substring of the camera description
    pub camera: Option<String>,
    /// Case-insensitive substring of the transcription
    pub transcription_contains: Option<String>,
    /// Case-insensitive substring of detected on-screen text
    pub text_contains: Option<String>,
    pub duration: Option<DurationHint>,
    /// Result cap; `None` returns the full match set
    pub limit: Option<usize>,
}

impl SceneQuery {
    pub fn semantic(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_face(mut self, face: impl Into<String>) -> Self {
        self.faces.push(face.into());
        self
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.objects.push(object.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the query constrains nothing at all
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && !self.has_predicates()
    }

    /// Whether any structured predicate is set
    pub fn has_predicates(&self) -> bool {
        !self.faces.is_empty()
            || !self.objects.is_empty()
            || !self.emotions.is_empty()
            || self.shot_type.is_some()
            || self.aspect_ratio.is_some()
            || self.camera.is_some()
            || self.transcription_contains.is_some()
            || self.text_contains.is_some()
            || self.duration.is_some()
    }

    /// Validates the query without touching any index.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(text) = &self.text {
            if text.trim().is_empty() {
                return Err(CoreError::InvalidQuery(
                    "Query text must not be blank".to_string(),
                ));
            }
        }
        for (label, entries) in [
            ("faces", &self.faces),
            ("objects", &self.objects),
            ("emotions", &self.emotions),
        ] {
            if entries.iter().any(|e| e.trim().is_empty()) {
                return Err(CoreError::InvalidQuery(format!(
                    "Query {label} entries must not be blank"
                )));
            }
        }
        for (label, value) in [
            ("camera", &self.camera),
            ("transcriptionContains", &self.transcription_contains),
            ("textContains", &self.text_contains),
        ] {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    return Err(CoreError::InvalidQuery(format!(
                        "Query {label} must not be blank"
                    )));
                }
            }
        }
        if let Some(duration) = &self.duration {
            if let Some(min) = duration.min_sec {
                if min < 0.0 {
                    return Err(CoreError::InvalidQuery(
                        "Duration minimum must not be negative".to_string(),
                    ));
                }
            }
            if let Some(max) = duration.max_sec {
                if max < 0.0 {
                    return Err(CoreError::InvalidQuery(
                        "Duration maximum must not be negative".to_string(),
                    ));
                }
            }
            if let (Some(min), Some(max)) = (duration.min_sec, duration.max_sec) {
                if min > max {
                    return Err(CoreError::InvalidQuery(format!(
                        "Duration minimum {min}s exceeds maximum {max}s"
                    )));
                }
            }
        }
        if self.limit == Some(0) {
            return Err(CoreError::InvalidQuery(
                "Result limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Results
// =============================================================================

/// How the result set was produced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    /// Semantic text present: ordered by descending similarity
    Ranked,
    /// Predicates only: ordered by video id, then start time
    Filtered,
    /// Empty query: the whole indexed collection
    Browse,
}

/// Search results with the mode that produced them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub mode: SearchMode,
    pub scenes: Vec<Scene>,
}
