//! Video Library Scanning
//!
//! Discovers video files under a library root and assigns them stable ids.
//! The id is derived from the library-relative path, so rescans and reindexes
//! of the same library always agree on which video is which.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::{CoreError, CoreResult, VideoId};

/// Name of the per-library state directory (index artifacts, face store, jobs)
pub const STATE_DIR_NAME: &str = ".scenedex";

/// Recognized video file extensions (lowercase)
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "wmv", "flv", "mpg", "mpeg", "ts",
];

// =============================================================================
// Video Source
// =============================================================================

/// A video file discovered in the library
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    /// Stable id derived from the library-relative path
    pub id: VideoId,
    /// Absolute path to the video file
    pub path: PathBuf,
    /// File stem for display
    pub display_name: String,
}

impl VideoSource {
    /// Builds a source for an absolute video path under `root`.
    ///
    /// The id is `{sanitized_stem}_{hash8}` where the hash covers the
    /// library-relative path. Renaming or moving the file changes its id and
    /// the video reindexes from scratch.
    pub fn from_library_path(root: &Path, path: &Path) -> CoreResult<Self> {
        let relative = path.strip_prefix(root).map_err(|_| {
            CoreError::ValidationError(format!(
                "Video path {} is not under library root {}",
                path.display(),
                root.display()
            ))
        })?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let mut hasher = Sha256::new();
        hasher.update(relative.to_string_lossy().as_bytes());
        let digest = hasher.finalize();
        let hash8: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

        let id = format!("{}_{hash8}", sanitize_stem(&stem));

        Ok(Self {
            id,
            path: path.to_path_buf(),
            display_name: stem,
        })
    }
}

/// Lowercases a file stem and replaces path-hostile characters so the id is
/// safe as a directory name.
fn sanitize_stem(stem: &str) -> String {
    let sanitized: String = stem
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
        "video".to_string()
    } else {
        sanitized
    }
}

// =============================================================================
// Library Scanner
// =============================================================================

/// Scans a library root for video files
pub struct LibraryScanner {
    root: PathBuf,
    max_depth: usize,
}

impl LibraryScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: 10,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the library and returns discovered videos sorted by path.
    ///
    /// Hidden entries and the state directory are skipped. Unreadable entries
    /// are logged and skipped rather than failing the whole scan.
    pub fn scan(&self) -> CoreResult<Vec<VideoSource>> {
        if !self.root.is_dir() {
            return Err(CoreError::LibraryScanFailed(format!(
                "Library root is not a directory: {}",
                self.root.display()
            )));
        }

        let mut sources = Vec::new();

        let walker = WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                // Never filter the root itself, only entries below it.
                e.depth() == 0 || !is_hidden_or_state(e.file_name().to_string_lossy().as_ref())
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry during library scan: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if !is_video_file(entry.path()) {
                continue;
            }

            match VideoSource::from_library_path(&self.root, entry.path()) {
                Ok(source) => sources.push(source),
                Err(e) => warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Skipping video with unusable path"
                ),
            }
        }

        sources.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            root = %self.root.display(),
            count = sources.len(),
            "library scan complete"
        );
        Ok(sources)
    }
}

fn is_hidden_or_state(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_finds_videos_and_skips_other_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.mp4"));
        touch(&dir.path().join("b.MOV"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/c.mkv"));

        let sources = LibraryScanner::new(dir.path()).scan().unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scan_skips_hidden_and_state_directories() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.mp4"));
        touch(&dir.path().join(".hidden/b.mp4"));
        touch(&dir.path().join(STATE_DIR_NAME).join("index/x/cache.mp4"));

        let sources = LibraryScanner::new(dir.path()).scan().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].display_name, "a");
    }

    #[test]
    fn test_scan_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = LibraryScanner::new(&missing).scan();
        assert!(matches!(result, Err(CoreError::LibraryScanFailed(_))));
    }

    #[test]
    fn test_video_id_is_stable_and_path_sensitive() {
        let root = Path::new("/library");
        let a1 = VideoSource::from_library_path(root, Path::new("/library/trips/Beach Day.mp4"))
            .unwrap();
        let a2 = VideoSource::from_library_path(root, Path::new("/library/trips/Beach Day.mp4"))
            .unwrap();
        let b = VideoSource::from_library_path(root, Path::new("/library/other/Beach Day.mp4"))
            .unwrap();

        assert_eq!(a1.id, a2.id);
        assert_ne!(a1.id, b.id);
        assert!(a1.id.starts_with("beach_day_"));
        assert_eq!(a1.display_name, "Beach Day");
    }

    #[test]
    fn test_video_id_is_path_safe() {
        let root = Path::new("/library");
        let source =
            VideoSource::from_library_path(root, Path::new("/library/weird name!?.mp4")).unwrap();
        assert!(crate::core::fs::validate_path_id_component(&source.id, "videoId").is_ok());
    }
}
