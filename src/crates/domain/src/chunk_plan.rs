//! Chunk plan derivation for the chunk generation phase.
//!
//! A video is rendered as fixed-duration chunks. A chunk whose start time
//! lands on a beat boundary (within 0.5 s) seeds from that beat's storyboard
//! image (a reference chunk); every other chunk seeds from the last frame of
//! its predecessor (a continuation chunk). Consecutive chunks from one
//! reference up to the next boundary form a group; groups are independent of
//! each other and internally sequential.

use crate::error::{DomainError, Result};
use crate::model_registry::VideoModel;
use crate::spec::VideoSpec;
use serde::{Deserialize, Serialize};

/// Tolerance for snapping a chunk start to a beat boundary, seconds.
pub const BEAT_BOUNDARY_SNAP_S: f64 = 0.5;

/// How a chunk is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Seeds from the storyboard image of the beat it starts.
    Reference,
    /// Seeds from the last frame of the preceding chunk.
    Continuation,
}

/// One chunk position in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSlot {
    /// Position in the final video, 0-based.
    pub index: usize,
    /// Start offset in seconds.
    pub start_s: f64,
    /// Rendered duration, seconds (the model's fixed chunk duration; the
    /// final chunk may cover less of the timeline but renders full length).
    pub duration_s: u32,
    pub kind: ChunkKind,
    /// The beat this chunk belongs to.
    pub beat_index: usize,
}

/// A maximal run of chunks seeded from one reference chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkGroup {
    /// Chunks in render order; the first is always a reference chunk.
    pub chunks: Vec<ChunkSlot>,
}

impl ChunkGroup {
    /// The reference chunk that heads the group.
    pub fn head(&self) -> &ChunkSlot {
        &self.chunks[0]
    }
}

/// The full chunk plan derived from a spec and a video model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub model_tag: String,
    pub chunk_duration_s: u32,
    pub total_chunks: usize,
    pub groups: Vec<ChunkGroup>,
}

impl ChunkPlan {
    /// Derive the plan: `total_chunks = ceil(duration_s / chunk_duration_s)`,
    /// classify each chunk, and partition into groups.
    ///
    /// The spec must already be valid (contiguous beats, allowed durations).
    pub fn derive(spec: &VideoSpec, model: &VideoModel) -> Result<ChunkPlan> {
        spec.validate()?;
        let chunk_duration = model.chunk_duration_s;
        let total_chunks = (spec.duration_s as usize).div_ceil(chunk_duration as usize);
        if total_chunks == 0 {
            return Err(DomainError::EmptySpec);
        }

        let boundaries: Vec<(usize, f64)> = spec
            .beats
            .iter()
            .map(|b| (b.index, b.start_s as f64))
            .collect();

        let mut slots = Vec::with_capacity(total_chunks);
        let mut current_beat = 0usize;
        for index in 0..total_chunks {
            let start_s = (index as u32 * chunk_duration) as f64;
            // Advance the owning beat: the last beat whose start <= chunk start.
            while let Some(&(_, next_start)) = boundaries.get(current_beat + 1) {
                if next_start <= start_s + BEAT_BOUNDARY_SNAP_S {
                    current_beat += 1;
                } else {
                    break;
                }
            }
            let on_boundary = boundaries
                .iter()
                .any(|&(_, b)| (b - start_s).abs() <= BEAT_BOUNDARY_SNAP_S);
            let kind = if on_boundary {
                ChunkKind::Reference
            } else {
                ChunkKind::Continuation
            };
            slots.push(ChunkSlot {
                index,
                start_s,
                duration_s: chunk_duration,
                kind,
                beat_index: current_beat,
            });
        }

        // Chunk 0 always starts beat 0.
        debug_assert_eq!(slots[0].kind, ChunkKind::Reference);

        let mut groups: Vec<ChunkGroup> = Vec::new();
        for slot in slots {
            match slot.kind {
                ChunkKind::Reference => groups.push(ChunkGroup { chunks: vec![slot] }),
                ChunkKind::Continuation => {
                    // validate() guarantees beats start at 0, so a reference
                    // group is always open here.
                    groups
                        .last_mut()
                        .expect("continuation chunk without a leading reference")
                        .chunks
                        .push(slot);
                }
            }
        }

        Ok(ChunkPlan {
            model_tag: model.tag.to_string(),
            chunk_duration_s: chunk_duration,
            total_chunks,
            groups,
        })
    }

    /// All chunks across groups, ordered by chunk index.
    pub fn slots_in_order(&self) -> Vec<&ChunkSlot> {
        let mut slots: Vec<&ChunkSlot> = self.groups.iter().flat_map(|g| &g.chunks).collect();
        slots.sort_by_key(|s| s.index);
        slots
    }

    /// Map from chunk index to beat index for reference chunks only.
    pub fn beat_to_chunk(&self) -> Vec<(usize, usize)> {
        self.groups
            .iter()
            .map(|g| (g.head().index, g.head().beat_index))
            .collect()
    }

    /// Look up the slot for a chunk index.
    pub fn slot(&self, chunk_index: usize) -> Option<&ChunkSlot> {
        self.groups
            .iter()
            .flat_map(|g| &g.chunks)
            .find(|s| s.index == chunk_index)
    }
}
