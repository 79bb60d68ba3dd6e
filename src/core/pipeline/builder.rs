//! Scene Building
//!
//! Fuses the transcript and frame analysis timelines into the final scene
//! list. Boundaries from both timelines are unioned into micro-windows, each
//! window is attributed to the frame segment it overlaps most, and adjacent
//! windows attributed to the same segment are coalesced back into one scene.

use tracing::debug;

use crate::core::artifacts::{FrameSegment, SceneFaceRef, TranscriptSegment};
use crate::core::scenes::{validate_scene_invariants, AspectRatio, Emotion, Scene, ShotType};
use crate::core::{CoreResult, TimeRange, TimeSec};

const BOUNDARY_EPSILON: f64 = 1e-6;

/// Builds the ordered, non-overlapping scene list for one video.
pub fn build_scenes(
    video_id: &str,
    transcript: &[TranscriptSegment],
    frame_segments: &[FrameSegment],
    face_refs: &[SceneFaceRef],
) -> CoreResult<Vec<Scene>> {
    let boundaries = union_boundaries(transcript, frame_segments);
    if boundaries.len() < 2 {
        return Ok(Vec::new());
    }

    // Attribute each micro-window to the frame segment it overlaps most.
    // A window with neither frame coverage nor transcript content is dead air
    // between the timelines; dropping it here keeps it from coalescing into a
    // neighboring scene.
    let windows: Vec<(TimeRange, Option<usize>)> = boundaries
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > BOUNDARY_EPSILON)
        .filter_map(|pair| {
            let range = TimeRange::new(pair[0], pair[1]);
            let segment = dominant_segment(&range, frame_segments);
            if segment.is_none() && !has_transcript(&range, transcript) {
                return None;
            }
            Some((range, segment))
        })
        .collect();

    let mut scenes = Vec::new();
    let mut current: Option<(TimeRange, Option<usize>)> = None;

    for (range, segment) in windows {
        current = match current.take() {
            Some((mut open_range, open_segment)) if open_segment == segment => {
                open_range.end_sec = range.end_sec;
                Some((open_range, open_segment))
            }
            Some(open) => {
                scenes.push(finish_scene(video_id, &open, transcript, frame_segments, face_refs));
                Some((range, segment))
            }
            None => Some((range, segment)),
        };
    }
    if let Some(open) = current {
        scenes.push(finish_scene(video_id, &open, transcript, frame_segments, face_refs));
    }

    validate_scene_invariants(&scenes)?;
    debug!(video_id, count = scenes.len(), "built scenes");
    Ok(scenes)
}

/// Unions all segment boundaries into a sorted, deduplicated list.
fn union_boundaries(
    transcript: &[TranscriptSegment],
    frame_segments: &[FrameSegment],
) -> Vec<TimeSec> {
    let mut boundaries: Vec<TimeSec> = transcript
        .iter()
        .flat_map(|s| [s.start_sec, s.end_sec])
        .chain(frame_segments.iter().flat_map(|s| [s.start_sec, s.end_sec]))
        .collect();
    boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    boundaries.dedup_by(|a, b| (*a - *b).abs() <= BOUNDARY_EPSILON);
    boundaries
}

fn has_transcript(range: &TimeRange, transcript: &[TranscriptSegment]) -> bool {
    transcript.iter().any(|s| {
        !s.text.trim().is_empty() && range.overlaps(&TimeRange::new(s.start_sec, s.end_sec))
    })
}

fn dominant_segment(range: &TimeRange, frame_segments: &[FrameSegment]) -> Option<usize> {
    frame_segments
        .iter()
        .enumerate()
        .filter_map(|(i, segment)| {
            let overlap = range.end_sec.min(segment.end_sec) - range.start_sec.max(segment.start_sec);
            if overlap > BOUNDARY_EPSILON {
                Some((i, overlap))
            } else {
                None
            }
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

fn finish_scene(
    video_id: &str,
    window: &(TimeRange, Option<usize>),
    transcript: &[TranscriptSegment],
    frame_segments: &[FrameSegment],
    face_refs: &[SceneFaceRef],
) -> Scene {
    let (range, segment_index) = window;
    let segment = segment_index.map(|i| &frame_segments[i]);

    let transcription = transcript
        .iter()
        .filter(|s| range.overlaps(&TimeRange::new(s.start_sec, s.end_sec)))
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut faces = Vec::new();
    let mut emotions = Vec::new();
    for face_ref in face_refs {
        if !range.contains(face_ref.timestamp_sec) {
            continue;
        }
        if !faces
            .iter()
            .any(|f: &String| f.eq_ignore_ascii_case(&face_ref.identity_ref))
        {
            faces.push(face_ref.identity_ref.clone());
        }
        if let Some(label) = &face_ref.emotion {
            emotions.push(Emotion {
                identity_ref: face_ref.identity_ref.clone(),
                label: label.clone(),
            });
        }
    }

    Scene {
        id: ulid::Ulid::new().to_string(),
        video_id: video_id.to_string(),
        start_sec: range.start_sec,
        end_sec: range.end_sec,
        description: segment.map(|s| s.description.clone()).unwrap_or_default(),
        transcription,
        objects: segment.map(|s| s.objects.clone()).unwrap_or_default(),
        faces,
        emotions,
        shot_type: segment.map(|s| s.shot_type).unwrap_or(ShotType::MediumShot),
        aspect_ratio: segment
            .map(|s| s.aspect_ratio)
            .unwrap_or(AspectRatio::Widescreen),
        camera: segment
            .map(|s| s.camera.clone())
            .unwrap_or_else(|| "static".to_string()),
        dominant_color: segment
            .map(|s| s.dominant_color.clone())
            .unwrap_or_default(),
        detected_text: segment.map(|s| s.detected_text.clone()).unwrap_or_default(),
    }
}
