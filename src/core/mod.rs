//! Scenedex Core
//!
//! Core engine modules: library scanning, the stage-artifact pipeline, hybrid
//! search, the face identity store, and the durable job system.

pub mod artifacts;
pub mod error;
pub mod faces;
pub mod fs;
pub mod jobs;
pub mod library;
pub mod pipeline;
pub mod providers;
pub mod scenes;
pub mod search;
pub mod settings;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::{FaceId, JobId, SceneId, TimeRange, TimeSec, VideoId};
