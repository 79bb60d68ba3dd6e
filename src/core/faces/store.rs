//! Face Identity Store
//!
//! Persists the known and unknown face collections as JSON indexes under
//! `{library}/.scenedex/faces/` and propagates identity renames back into
//! scene artifacts. Every read-modify-write of an index file runs under that
//! file's path lock, so concurrent indexing workers and user-driven labeling
//! cannot lose updates.
//!
//! Labeling mutates in a fixed order: crop image move, then known append,
//! then unknown removal. A crash between steps leaves a duplicate (visible in
//! both collections), never a lost face.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::artifacts::{ArtifactStore, ScenesArtifact, Stage};
use crate::core::fs::lock::{with_path_lock, LockConfig};
use crate::core::fs::atomic_write_json_pretty;
use crate::core::library::STATE_DIR_NAME;
use crate::core::{CoreError, CoreResult, FaceId, TimeSec};

use super::{FaceObservation, KnownFace, UnknownFace, UnknownFacePage};

/// Name of the face store directory under the state directory
pub const FACES_DIR_NAME: &str = "faces";

const KNOWN_FILE: &str = "known_faces.json";
const UNKNOWN_FILE: &str = "unknown_faces.json";

// =============================================================================
// Index Files
// =============================================================================

/// Known identities keyed by canonical name
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct KnownFaceIndex {
    faces: BTreeMap<String, KnownFace>,
}

/// Unlabeled detections in detection order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct UnknownFaceIndex {
    faces: Vec<UnknownFace>,
}

// =============================================================================
// Face Store
// =============================================================================

/// Concurrency-safe store for face identities
#[derive(Clone, Debug)]
pub struct FaceStore {
    faces_dir: PathBuf,
    artifacts: ArtifactStore,
    lock_config: LockConfig,
}

impl FaceStore {
    /// Creates a store rooted at `{library_root}/.scenedex/faces`
    pub fn new(library_root: impl Into<PathBuf>) -> Self {
        let root = library_root.into();
        Self {
            faces_dir: root.join(STATE_DIR_NAME).join(FACES_DIR_NAME),
            artifacts: ArtifactStore::new(root),
            lock_config: LockConfig::default(),
        }
    }

    pub fn with_lock_config(mut self, lock_config: LockConfig) -> Self {
        self.lock_config = lock_config;
        self
    }

    pub fn faces_dir(&self) -> &Path {
        &self.faces_dir
    }

    fn known_path(&self) -> PathBuf {
        self.faces_dir.join(KNOWN_FILE)
    }

    fn unknown_path(&self) -> PathBuf {
        self.faces_dir.join(UNKNOWN_FILE)
    }

    // =========================================================================
    // Unknown Pool
    // =========================================================================

    /// Records a detection in the unknown pool.
    ///
    /// Detections are deduplicated by crop hash: re-analyzing a video returns
    /// the already-registered face id instead of inserting a duplicate.
    pub fn register_unknown(
        &self,
        video_id: &str,
        observation: &FaceObservation,
    ) -> CoreResult<FaceId> {
        let path = self.unknown_path();
        with_path_lock(&path, self.lock_config, || {
            let mut index = read_index::<UnknownFaceIndex>(&path)?;

            if let Some(existing) = index
                .faces
                .iter()
                .find(|f| f.crop_hash == observation.crop_hash)
            {
                return Ok(existing.face_id.clone());
            }

            let face_id = ulid::Ulid::new().to_string();
            index.faces.push(UnknownFace {
                face_id: face_id.clone(),
                image_path: observation.image_path.clone(),
                video_id: video_id.to_string(),
                timestamp_sec: observation.timestamp_sec,
                bounding_box: observation.bounding_box,
                embedding: observation.embedding.clone(),
                context: observation.context.clone(),
                crop_hash: observation.crop_hash.clone(),
                detected_at: chrono::Utc::now().to_rfc3339(),
            });
            atomic_write_json_pretty(&path, &index)?;
            debug!(video_id, face_id, "registered unknown face");
            Ok(face_id)
        })
    }

    /// Returns one page of the unknown pool, oldest detections first.
    pub fn list_unknown(&self, page: usize, page_size: usize) -> CoreResult<UnknownFacePage> {
        if page_size == 0 {
            return Err(CoreError::ValidationError(
                "Page size must be at least 1".to_string(),
            ));
        }
        let index = read_index::<UnknownFaceIndex>(&self.unknown_path())?;
        let total = index.faces.len();
        let faces = index
            .faces
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect();
        Ok(UnknownFacePage {
            faces,
            page,
            page_size,
            total,
        })
    }

    /// Removes a detection from the unknown pool and deletes its crop image.
    pub fn delete_unknown(&self, face_id: &str) -> CoreResult<()> {
        let path = self.unknown_path();
        let removed = with_path_lock(&path, self.lock_config, || {
            let mut index = read_index::<UnknownFaceIndex>(&path)?;
            let before = index.faces.len();
            let removed: Vec<UnknownFace> = index
                .faces
                .iter()
                .filter(|f| f.face_id == face_id)
                .cloned()
                .collect();
            index.faces.retain(|f| f.face_id != face_id);
            if index.faces.len() == before {
                return Err(CoreError::UnknownFaceNotFound(face_id.to_string()));
            }
            atomic_write_json_pretty(&path, &index)?;
            Ok(removed)
        })?;

        for face in removed {
            if let Err(e) = std::fs::remove_file(&face.image_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(face_id, error = %e, "failed to delete face crop image");
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Labeling
    // =========================================================================

    /// Promotes an unknown face into the known set under `name`.
    ///
    /// If the name already exists the crop is appended to that identity.
    /// Mutation order is image move, known append, unknown removal; the crop
    /// image is restored if the known append fails.
    pub fn label_unknown(&self, face_id: &str, name: &str) -> CoreResult<KnownFace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationError(
                "Face name must not be empty".to_string(),
            ));
        }

        let unknown = read_index::<UnknownFaceIndex>(&self.unknown_path())?
            .faces
            .into_iter()
            .find(|f| f.face_id == face_id)
            .ok_or_else(|| CoreError::UnknownFaceNotFound(face_id.to_string()))?;

        let moved_image = self.move_crop_into_known(&unknown.image_path, name)?;

        let known_path = self.known_path();
        let known = with_path_lock(&known_path, self.lock_config, || {
            let mut index = read_index::<KnownFaceIndex>(&known_path)?;
            let now = chrono::Utc::now().to_rfc3339();
            let entry = index
                .faces
                .entry(name.to_string())
                .or_insert_with(|| KnownFace {
                    name: name.to_string(),
                    images: Vec::new(),
                    aliases: Vec::new(),
                    created_at: now.clone(),
                    updated_at: now.clone(),
                });
            entry.images.push(moved_image.clone());
            entry.updated_at = now;
            let known = entry.clone();
            atomic_write_json_pretty(&known_path, &index)?;
            Ok(known)
        });

        let known = match known {
            Ok(k) => k,
            Err(e) => {
                // Put the crop back so the unknown record stays consistent.
                let _ = std::fs::rename(&moved_image, &unknown.image_path);
                return Err(e);
            }
        };

        let unknown_path = self.unknown_path();
        with_path_lock(&unknown_path, self.lock_config, || {
            let mut index = read_index::<UnknownFaceIndex>(&unknown_path)?;
            index.faces.retain(|f| f.face_id != face_id);
            atomic_write_json_pretty(&unknown_path, &index)
        })?;

        debug!(face_id, name, "labeled unknown face");
        Ok(known)
    }

    fn move_crop_into_known(&self, image_path: &str, name: &str) -> CoreResult<String> {
        let src = Path::new(image_path);
        let file_name = src
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.jpg", ulid::Ulid::new()));
        let dest_dir = self.faces_dir.join("known").join(sanitize_name_dir(name));
        std::fs::create_dir_all(&dest_dir)?;
        let dest = dest_dir.join(file_name);

        if std::fs::rename(src, &dest).is_err() {
            // Cross-device fallback
            std::fs::copy(src, &dest)?;
            let _ = std::fs::remove_file(src);
        }
        Ok(dest.display().to_string())
    }

    // =========================================================================
    // Known Set
    // =========================================================================

    /// Returns all known identities, sorted by canonical name
    pub fn list_known(&self) -> CoreResult<Vec<KnownFace>> {
        let index = read_index::<KnownFaceIndex>(&self.known_path())?;
        Ok(index.faces.into_values().collect())
    }

    /// Resolves a name or alias to its canonical name (case-insensitive)
    pub fn resolve_name(&self, reference: &str) -> CoreResult<Option<String>> {
        let index = read_index::<KnownFaceIndex>(&self.known_path())?;
        Ok(index
            .faces
            .values()
            .find(|f| f.matches(reference))
            .map(|f| f.name.clone()))
    }

    /// Merges identities into one.
    ///
    /// The first name is the canonical survivor; the others' images fold into
    /// it and their names and aliases become aliases of the survivor. Aliases
    /// are retained indefinitely so scene references to merged-away names
    /// keep resolving.
    pub fn merge(&self, names: &[String]) -> CoreResult<String> {
        if names.len() < 2 {
            return Err(CoreError::ValidationError(
                "Merge requires at least two identities".to_string(),
            ));
        }

        let known_path = self.known_path();
        with_path_lock(&known_path, self.lock_config, || {
            let mut index = read_index::<KnownFaceIndex>(&known_path)?;

            let canonical_key = find_key(&index, &names[0])?;
            let mut absorbed_images = Vec::new();
            let mut absorbed_aliases = Vec::new();

            for name in &names[1..] {
                let key = find_key(&index, name)?;
                if key == canonical_key {
                    continue;
                }
                if let Some(face) = index.faces.remove(&key) {
                    absorbed_images.extend(face.images);
                    absorbed_aliases.push(face.name);
                    absorbed_aliases.extend(face.aliases);
                }
            }

            let canonical = index
                .faces
                .get_mut(&canonical_key)
                .ok_or_else(|| CoreError::KnownFaceNotFound(names[0].clone()))?;
            canonical.images.extend(absorbed_images);
            for alias in absorbed_aliases {
                if !canonical.matches(&alias) {
                    canonical.aliases.push(alias);
                }
            }
            canonical.updated_at = chrono::Utc::now().to_rfc3339();
            let survivor = canonical.name.clone();

            atomic_write_json_pretty(&known_path, &index)?;
            debug!(survivor = %survivor, merged = names.len() - 1, "merged face identities");
            Ok(survivor)
        })
    }

    // =========================================================================
    // Reindex Propagation
    // =========================================================================

    /// Rewrites a video's scene artifact so references to `old_ref` become
    /// `new_name`. Returns the number of scenes rewritten.
    ///
    /// If the unknown pool still records `old_ref` for this video, only the
    /// scenes containing its detection timestamp are rewritten; otherwise all
    /// scenes mentioning `old_ref` are.
    pub fn reindex(&self, old_ref: &str, new_name: &str, video_id: &str) -> CoreResult<usize> {
        let scenes_path = self.artifacts.artifact_path(video_id, Stage::Scenes)?;
        let timestamp = self.unknown_timestamp_for(old_ref, video_id)?;

        with_path_lock(&scenes_path, self.lock_config, || {
            let mut artifact: ScenesArtifact = self
                .artifacts
                .load(video_id, Stage::Scenes)?
                .ok_or_else(|| CoreError::ArtifactMissing {
                    video_id: video_id.to_string(),
                    stage: Stage::Scenes.label(),
                })?;

            let mut rewritten = 0;
            for scene in &mut artifact.scenes {
                if !scene.has_face(old_ref) {
                    continue;
                }
                if let Some(ts) = timestamp {
                    if !scene.range().contains(ts) {
                        continue;
                    }
                }
                rewrite_scene_refs(scene, old_ref, new_name);
                rewritten += 1;
            }

            if rewritten > 0 {
                self.artifacts.save(video_id, Stage::Scenes, &artifact)?;
            }
            debug!(video_id, old_ref, new_name, rewritten, "reindexed face references");
            Ok(rewritten)
        })
    }

    fn unknown_timestamp_for(
        &self,
        face_id: &str,
        video_id: &str,
    ) -> CoreResult<Option<TimeSec>> {
        let index = read_index::<UnknownFaceIndex>(&self.unknown_path())?;
        Ok(index
            .faces
            .iter()
            .find(|f| f.face_id == face_id && f.video_id == video_id)
            .map(|f| f.timestamp_sec))
    }

    /// Rewrites references in every indexed video. Returns total scenes
    /// rewritten.
    pub fn reindex_all(&self, old_ref: &str, new_name: &str) -> CoreResult<usize> {
        let mut total = 0;
        for video_id in self.artifacts.list_indexed()? {
            if self.artifacts.exists(&video_id, Stage::Scenes)? {
                total += self.reindex(old_ref, new_name, &video_id)?;
            }
        }
        Ok(total)
    }
}

fn rewrite_scene_refs(scene: &mut crate::core::scenes::Scene, old_ref: &str, new_name: &str) {
    for face in &mut scene.faces {
        if face.eq_ignore_ascii_case(old_ref) {
            *face = new_name.to_string();
        }
    }
    // Dedup in case the scene already referenced the new name.
    let mut seen = Vec::new();
    scene.faces.retain(|f| {
        let lower = f.to_lowercase();
        if seen.contains(&lower) {
            false
        } else {
            seen.push(lower);
            true
        }
    });
    for emotion in &mut scene.emotions {
        if emotion.identity_ref.eq_ignore_ascii_case(old_ref) {
            emotion.identity_ref = new_name.to_string();
        }
    }
}

fn find_key(index: &KnownFaceIndex, reference: &str) -> CoreResult<String> {
    index
        .faces
        .iter()
        .find(|(_, f)| f.matches(reference))
        .map(|(k, _)| k.clone())
        .ok_or_else(|| CoreError::KnownFaceNotFound(reference.to_string()))
}

fn sanitize_name_dir(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

fn read_index<T: Default + serde::de::DeserializeOwned>(path: &Path) -> CoreResult<T> {
    if !path.is_file() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::ArtifactCorrupted {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
