//! Hybrid Search Engine
//!
//! Retrieval runs in two phases. When the query carries free text, the engine
//! embeds it and ranks the collection by cosine similarity, keeping a
//! candidate pool several times larger than the requested result count so
//! that structured filters applied afterwards do not starve the results.
//! Predicates AND across categories and OR within a category's entries.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::core::artifacts::{ArtifactStore, EmbeddingsArtifact, ScenesArtifact, Stage};
use crate::core::providers::{EmbeddingProvider, QueryParserProvider};
use crate::core::scenes::Scene;
use crate::core::{CoreError, CoreResult};

use super::{SceneQuery, SearchMode, SearchResults};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Clone, Copy, Debug)]
pub struct SearchConfig {
    /// Candidate pool size as a multiple of the result cap
    pub candidate_multiplier: usize,
    /// Floor on the candidate pool regardless of the cap
    pub min_candidate_pool: usize,
    /// Result cap used for pool sizing when the query sets none
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_multiplier: 5,
            min_candidate_pool: 50,
            default_limit: 20,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Searches the indexed scene collection
pub struct SearchEngine {
    artifacts: ArtifactStore,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

struct IndexedScene {
    scene: Scene,
    vector: Option<Vec<f32>>,
}

impl SearchEngine {
    pub fn new(library_root: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            artifacts: ArtifactStore::new(library_root),
            embedder,
            config: SearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Parses a free-text prompt into a structured query and executes it.
    pub async fn search_prompt(
        &self,
        parser: &dyn QueryParserProvider,
        prompt: &str,
    ) -> CoreResult<SearchResults> {
        let query = parser.parse_prompt(prompt).await?;
        self.search(&query).await
    }

    /// Executes a query against every indexed video.
    pub async fn search(&self, query: &SceneQuery) -> CoreResult<SearchResults> {
        query.validate()?;

        let semantic = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let collection = self.load_collection(semantic.is_some())?;
        debug!(scenes = collection.len(), "loaded scene collection");

        let mut candidates: Vec<IndexedScene> = if let Some(text) = semantic {
            let query_vector = self.embedder.embed(text).await?;
            let cap = query.limit.unwrap_or(self.config.default_limit);
            let pool_size = (cap * self.config.candidate_multiplier)
                .max(self.config.min_candidate_pool);

            let mut scored: Vec<(f32, IndexedScene)> = collection
                .into_iter()
                .filter_map(|entry| {
                    let vector = entry.vector.as_ref()?;
                    let score = cosine_similarity(&query_vector, vector);
                    Some((score, entry))
                })
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored
                .into_iter()
                .take(pool_size)
                .map(|(_, entry)| entry)
                .collect()
        } else {
            collection
        };

        candidates.retain(|entry| matches_predicates(&entry.scene, query));

        let mode = if semantic.is_some() {
            SearchMode::Ranked
        } else if query.has_predicates() {
            SearchMode::Filtered
        } else {
            SearchMode::Browse
        };

        let mut scenes: Vec<Scene> = candidates.into_iter().map(|e| e.scene).collect();
        if mode != SearchMode::Ranked {
            scenes.sort_by(|a, b| {
                a.video_id.cmp(&b.video_id).then(
                    a.start_sec
                        .partial_cmp(&b.start_sec)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
            });
        }
        if let Some(limit) = query.limit {
            scenes.truncate(limit);
        }

        Ok(SearchResults { mode, scenes })
    }

    fn load_collection(&self, require_vectors: bool) -> CoreResult<Vec<IndexedScene>> {
        let expected_dim = self.embedder.dimension();
        let mut collection = Vec::new();

        for video_id in self.artifacts.list_indexed()? {
            let Some(scenes) = self
                .artifacts
                .load::<ScenesArtifact>(&video_id, Stage::Scenes)?
            else {
                continue;
            };
            let embeddings: Option<EmbeddingsArtifact> =
                self.artifacts.load(&video_id, Stage::Embeddings)?;

            if require_vectors {
                if let Some(embeddings) = &embeddings {
                    if embeddings.dimension != expected_dim {
                        return Err(CoreError::EmbeddingDimensionMismatch {
                            expected: expected_dim,
                            actual: embeddings.dimension,
                        });
                    }
                }
            }

            for scene in scenes.scenes {
                let vector = embeddings
                    .as_ref()
                    .and_then(|e| e.vectors.get(&scene.id))
                    .cloned();
                collection.push(IndexedScene { scene, vector });
            }
        }
        Ok(collection)
    }
}

// =============================================================================
// Predicate Matching
// =============================================================================

fn matches_predicates(scene: &Scene, query: &SceneQuery) -> bool {
    if !query.faces.is_empty() && !query.faces.iter().any(|f| scene.has_face(f)) {
        return false;
    }
    if !query.objects.is_empty() {
        let any = query.objects.iter().any(|wanted| {
            scene
                .objects
                .iter()
                .any(|o| o.eq_ignore_ascii_case(wanted))
        });
        if !any {
            return false;
        }
    }
    if !query.emotions.is_empty() && !query.emotions.iter().any(|e| matches_emotion(scene, e)) {
        return false;
    }
    if let Some(shot_type) = query.shot_type {
        if scene.shot_type != shot_type {
            return false;
        }
    }
    if let Some(aspect_ratio) = query.aspect_ratio {
        if scene.aspect_ratio != aspect_ratio {
            return false;
        }
    }
    if let Some(camera) = &query.camera {
        if !contains_ci(&scene.camera, camera) {
            return false;
        }
    }
    if let Some(needle) = &query.transcription_contains {
        if !contains_ci(&scene.transcription, needle) {
            return false;
        }
    }
    if let Some(needle) = &query.text_contains {
        if !scene.detected_text.iter().any(|t| contains_ci(t, needle)) {
            return false;
        }
    }
    if let Some(duration) = &query.duration {
        let d = scene.duration();
        if duration.min_sec.is_some_and(|min| d < min) {
            return false;
        }
        if duration.max_sec.is_some_and(|max| d > max) {
            return false;
        }
    }
    true
}

/// An emotion entry is either a bare label ("happy") or scoped to an identity
/// ("alice:happy").
fn matches_emotion(scene: &Scene, entry: &str) -> bool {
    match entry.split_once(':') {
        Some((identity, label)) => scene.emotions.iter().any(|e| {
            e.identity_ref.eq_ignore_ascii_case(identity.trim())
                && e.label.eq_ignore_ascii_case(label.trim())
        }),
        None => scene
            .emotions
            .iter()
            .any(|e| e.label.eq_ignore_ascii_case(entry.trim())),
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// =============================================================================
// Similarity
// =============================================================================

/// Cosine similarity between two vectors; zero when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scenes::{test_scene, Emotion, ShotType};
    use crate::core::search::DurationHint;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Deterministic axis embedder: "beach" texts map to x, "city" to y,
    /// everything else to z.
    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
            let lower = text.to_lowercase();
            if lower.contains("beach") {
                Ok(vec![1.0, 0.0, 0.0])
            } else if lower.contains("city") {
                Ok(vec![0.0, 1.0, 0.0])
            } else {
                Ok(vec![0.0, 0.0, 1.0])
            }
        }
    }

    async fn seed_library(dir: &TempDir) -> ArtifactStore {
        let artifacts = ArtifactStore::new(dir.path());
        let embedder = AxisEmbedder;

        let mut beach = test_scene("vid_a", 0.0, 4.0);
        beach.description = "waves on the beach".to_string();
        beach.objects = vec!["surfboard".to_string()];
        beach.faces = vec!["Alice".to_string()];
        beach.emotions = vec![Emotion {
            identity_ref: "Alice".to_string(),
            label: "happy".to_string(),
        }];
        beach.transcription = "what a perfect day".to_string();

        let mut city = test_scene("vid_a", 4.0, 5.5);
        city.description = "city skyline at night".to_string();
        city.objects = vec!["skyscraper".to_string()];
        city.shot_type = ShotType::LongShot;
        city.detected_text = vec!["OPEN 24H".to_string()];

        let mut vectors = BTreeMap::new();
        vectors.insert(
            beach.id.clone(),
            embedder.embed(&beach.description).await.unwrap(),
        );
        vectors.insert(
            city.id.clone(),
            embedder.embed(&city.description).await.unwrap(),
        );

        let scenes = ScenesArtifact {
            video_id: "vid_a".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: "test".to_string(),
            scenes: vec![beach, city],
        };
        let embeddings = EmbeddingsArtifact {
            video_id: "vid_a".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: "test".to_string(),
            dimension: 3,
            vectors,
        };
        artifacts.save("vid_a", Stage::Scenes, &scenes).unwrap();
        artifacts
            .save("vid_a", Stage::Embeddings, &embeddings)
            .unwrap();
        artifacts
    }

    fn engine(dir: &TempDir) -> SearchEngine {
        SearchEngine::new(dir.path(), Arc::new(AxisEmbedder))
    }

    #[tokio::test]
    async fn test_semantic_query_ranks_by_similarity() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let results = engine(&dir)
            .search(&SceneQuery::semantic("a day at the beach"))
            .await
            .unwrap();
        assert_eq!(results.mode, SearchMode::Ranked);
        assert_eq!(results.scenes[0].description, "waves on the beach");
    }

    #[tokio::test]
    async fn test_predicates_filter_within_semantic_pool() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let query = SceneQuery::semantic("city skyline").with_face("Alice");
        let results = engine(&dir).search(&query).await.unwrap();
        // Only the beach scene has Alice, even though city ranks higher.
        assert_eq!(results.scenes.len(), 1);
        assert!(results.scenes[0].has_face("Alice"));
    }

    #[tokio::test]
    async fn test_filtered_mode_without_text() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let query = SceneQuery {
            shot_type: Some(ShotType::LongShot),
            ..Default::default()
        };
        let results = engine(&dir).search(&query).await.unwrap();
        assert_eq!(results.mode, SearchMode::Filtered);
        assert_eq!(results.scenes.len(), 1);
        assert_eq!(results.scenes[0].shot_type, ShotType::LongShot);
    }

    #[tokio::test]
    async fn test_browse_mode_returns_whole_collection_in_order() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let results = engine(&dir).search(&SceneQuery::default()).await.unwrap();
        assert_eq!(results.mode, SearchMode::Browse);
        assert_eq!(results.scenes.len(), 2);
        assert!(results.scenes[0].start_sec <= results.scenes[1].start_sec);
    }

    #[tokio::test]
    async fn test_emotion_predicate_scoped_and_bare() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let bare = SceneQuery {
            emotions: vec!["happy".to_string()],
            ..Default::default()
        };
        assert_eq!(engine(&dir).search(&bare).await.unwrap().scenes.len(), 1);

        let scoped = SceneQuery {
            emotions: vec!["alice:happy".to_string()],
            ..Default::default()
        };
        assert_eq!(engine(&dir).search(&scoped).await.unwrap().scenes.len(), 1);

        let wrong = SceneQuery {
            emotions: vec!["bob:happy".to_string()],
            ..Default::default()
        };
        assert!(engine(&dir).search(&wrong).await.unwrap().scenes.is_empty());
    }

    #[tokio::test]
    async fn test_substring_predicates_are_case_insensitive() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let query = SceneQuery {
            transcription_contains: Some("PERFECT DAY".to_string()),
            ..Default::default()
        };
        assert_eq!(engine(&dir).search(&query).await.unwrap().scenes.len(), 1);

        let ocr = SceneQuery {
            text_contains: Some("open 24".to_string()),
            ..Default::default()
        };
        assert_eq!(engine(&dir).search(&ocr).await.unwrap().scenes.len(), 1);
    }

    #[tokio::test]
    async fn test_duration_hint_filters() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let query = SceneQuery {
            duration: Some(DurationHint {
                min_sec: Some(3.0),
                max_sec: None,
            }),
            ..Default::default()
        };
        let results = engine(&dir).search(&query).await.unwrap();
        assert_eq!(results.scenes.len(), 1);
        assert!(results.scenes[0].duration() >= 3.0);
    }

    #[tokio::test]
    async fn test_limit_caps_results() {
        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let query = SceneQuery::default().with_limit(1);
        let results = engine(&dir).search(&query).await.unwrap();
        assert_eq!(results.scenes.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_query_fails_before_embedding() {
        let dir = TempDir::new().unwrap();
        let results = engine(&dir).search(&SceneQuery::semantic("  ")).await;
        assert!(matches!(results, Err(CoreError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_reported() {
        let dir = TempDir::new().unwrap();
        let artifacts = seed_library(&dir).await;

        let bad = EmbeddingsArtifact {
            video_id: "vid_a".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            generator: "test".to_string(),
            dimension: 7,
            vectors: BTreeMap::new(),
        };
        artifacts.save("vid_a", Stage::Embeddings, &bad).unwrap();

        let result = engine(&dir).search(&SceneQuery::semantic("beach")).await;
        assert!(matches!(
            result,
            Err(CoreError::EmbeddingDimensionMismatch {
                expected: 3,
                actual: 7
            })
        ));
    }

    #[tokio::test]
    async fn test_search_prompt_parses_then_searches() {
        struct KeywordParser;

        #[async_trait]
        impl QueryParserProvider for KeywordParser {
            async fn parse_prompt(&self, prompt: &str) -> CoreResult<SceneQuery> {
                let mut query = SceneQuery::semantic(prompt);
                if prompt.to_lowercase().contains("alice") {
                    query.faces.push("Alice".to_string());
                }
                Ok(query)
            }
        }

        let dir = TempDir::new().unwrap();
        seed_library(&dir).await;

        let results = engine(&dir)
            .search_prompt(&KeywordParser, "alice at the beach")
            .await
            .unwrap();
        assert_eq!(results.mode, SearchMode::Ranked);
        assert_eq!(results.scenes.len(), 1);
        assert!(results.scenes[0].has_face("Alice"));
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
