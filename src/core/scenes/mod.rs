//! Scene Model
//!
//! A scene is a time-bounded, described, embedded unit of a video and the
//! atomic unit of search results. Scenes for one video are ordered by start
//! time and pairwise non-overlapping; once embedded they are immutable except
//! for face-reference propagation on identity renames.

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult, SceneId, TimeRange, TimeSec, VideoId};

// =============================================================================
// Scene Attributes
// =============================================================================

/// Shot framing classification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShotType {
    #[default]
    MediumShot,
    LongShot,
    CloseUp,
}

/// Frame aspect ratio classification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "21:9")]
    Cinemascope,
}

/// Dominant color of a scene
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DominantColor {
    /// Human-readable color name (e.g. "teal")
    pub name: String,
    /// Hex value (e.g. "#1f8a8c")
    pub hex: String,
}

/// An emotion observed on a face identity within a scene
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emotion {
    /// Face identity reference (resolved name or unresolved face id)
    pub identity_ref: String,
    /// Emotion label (e.g. "happy")
    pub label: String,
}

// =============================================================================
// Scene
// =============================================================================

/// A searchable scene record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Stable scene id (ULID)
    pub id: SceneId,
    /// Owning video source
    pub video_id: VideoId,
    /// Start time in seconds
    pub start_sec: TimeSec,
    /// End time in seconds (always > start)
    pub end_sec: TimeSec,
    /// Visual description (the text that gets embedded)
    pub description: String,
    /// Transcribed speech within the scene (may be empty)
    pub transcription: String,
    /// Detected object labels
    pub objects: Vec<String>,
    /// Face identity references: resolved names or unresolved face ids
    pub faces: Vec<String>,
    /// Observed emotions per identity reference
    pub emotions: Vec<Emotion>,
    /// Shot framing
    pub shot_type: ShotType,
    /// Aspect ratio
    pub aspect_ratio: AspectRatio,
    /// Camera description (e.g. "static", "handheld pan")
    pub camera: String,
    /// Dominant color
    pub dominant_color: DominantColor,
    /// Text detected on screen (OCR)
    pub detected_text: Vec<String>,
}

impl Scene {
    /// Returns the scene's time range
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_sec, self.end_sec)
    }

    /// Returns duration in seconds
    pub fn duration(&self) -> TimeSec {
        self.end_sec - self.start_sec
    }

    /// Checks whether the scene references a face identity (case-insensitive)
    pub fn has_face(&self, identity_ref: &str) -> bool {
        self.faces
            .iter()
            .any(|f| f.eq_ignore_ascii_case(identity_ref))
    }
}

// =============================================================================
// Invariants
// =============================================================================

/// Validates that scenes are ordered by start time, pairwise non-overlapping,
/// and each strictly positive in duration.
pub fn validate_scene_invariants(scenes: &[Scene]) -> CoreResult<()> {
    for (i, scene) in scenes.iter().enumerate() {
        if scene.end_sec <= scene.start_sec {
            return Err(CoreError::ValidationError(format!(
                "Scene {} has non-positive duration: {}~{}s",
                scene.id, scene.start_sec, scene.end_sec
            )));
        }
        if i > 0 {
            let prev = &scenes[i - 1];
            if scene.start_sec < prev.start_sec {
                return Err(CoreError::ValidationError(format!(
                    "Scene {} out of order: starts at {}s before previous {}s",
                    scene.id, scene.start_sec, prev.start_sec
                )));
            }
            if scene.start_sec < prev.end_sec {
                return Err(CoreError::ValidationError(format!(
                    "Scene {} overlaps previous scene {} ({}s < {}s)",
                    scene.id, prev.id, scene.start_sec, prev.end_sec
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_scene(video_id: &str, start_sec: f64, end_sec: f64) -> Scene {
    Scene {
        id: ulid::Ulid::new().to_string(),
        video_id: video_id.to_string(),
        start_sec,
        end_sec,
        description: String::new(),
        transcription: String::new(),
        objects: Vec::new(),
        faces: Vec::new(),
        emotions: Vec::new(),
        shot_type: ShotType::MediumShot,
        aspect_ratio: AspectRatio::Widescreen,
        camera: "static".to_string(),
        dominant_color: DominantColor::default(),
        detected_text: Vec::new(),
    }
}
