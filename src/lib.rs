//! Scenedex
//!
//! Scene indexing and hybrid retrieval engine for video libraries.
//!
//! A library of video files is indexed through a resumable four-stage
//! pipeline (transcription, frame analysis, scene building, embedding); each
//! stage persists a JSON artifact per video, and an interrupted run resumes
//! at the first missing artifact. Indexed scenes are queried through a hybrid
//! engine that combines semantic ranking with structured filters, faces are
//! curated in a concurrency-safe identity store, and long-running work runs
//! through a durable background job queue.

pub mod core;
pub mod logging;

pub use crate::core::artifacts::{ArtifactStore, Stage, StageResolver};
pub use crate::core::error::{CoreError, CoreResult};
pub use crate::core::faces::FaceStore;
pub use crate::core::jobs::{start_workers, JobQueue, WorkerConfig};
pub use crate::core::library::{LibraryScanner, VideoSource};
pub use crate::core::pipeline::{IndexingOrchestrator, ProgressSink, VideoOutcome};
pub use crate::core::scenes::Scene;
pub use crate::core::search::{SceneQuery, SearchEngine, SearchResults};
pub use crate::core::settings::IndexerSettings;
