//! Shared domain types for the adforge video generation pipeline.
//!
//! This crate holds the pure data model: identifiers, job lifecycle states,
//! the typed video spec produced by the planning phase, the archetype and
//! beat libraries the planner composes from, the video model registry, chunk
//! plan derivation, artifact kinds with the canonical blob path codec, and
//! cost accounting. No I/O lives here.

pub mod artifact;
pub mod chunk_plan;
pub mod cost;
pub mod error;
pub mod ids;
pub mod job;
pub mod library;
pub mod model_registry;
pub mod spec;

pub use artifact::{ArtifactKind, BlobPath};
pub use chunk_plan::{ChunkGroup, ChunkKind, ChunkPlan, ChunkSlot};
pub use cost::{CostBreakdown, CostEntry};
pub use error::{DomainError, Result};
pub use ids::{ArtifactId, CheckpointId, JobId, UserId};
pub use job::{JobStatus, Phase};
pub use library::{ArchetypeLibrary, BeatLibrary};
pub use model_registry::{ModelRegistry, VideoModel};
pub use spec::{AudioSpec, Beat, ProductSpec, StyleSpec, VideoSpec};
