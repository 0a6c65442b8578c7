//! Chunk sub-scheduler: dependency-constrained parallel chunk rendering.
//!
//! Groups (one reference chunk plus its continuation chain) are independent
//! and run in parallel under a fan-out cap; inside a group each step feeds
//! the extracted last frame of its predecessor forward. Reassembly order
//! depends only on chunk index, never on completion order.

use crate::stages::{Result, StageError};
use async_trait::async_trait;
use domain::{ChunkGroup, ChunkPlan, ChunkSlot};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// One rendered chunk as the renderer hands it back.
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub video: Vec<u8>,
    /// What the provider charged for this chunk, USD.
    pub cost_usd: f64,
}

/// The rendered output of one chunk slot.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub slot: ChunkSlot,
    pub video: Vec<u8>,
    /// Provider charge for this chunk, USD.
    pub cost_usd: f64,
    /// Last frame extracted from this chunk; present iff a continuation
    /// step consumed it.
    pub last_frame: Option<Vec<u8>>,
}

/// The operations the scheduler drives; implemented by the chunks stage and
/// by test doubles.
#[async_trait]
pub trait ChunkRenderer: Send + Sync {
    /// Storyboard image bytes for the beat a group starts.
    async fn reference_image(&self, beat_index: usize) -> Result<Vec<u8>>;

    /// Render one chunk from its init image.
    async fn render(&self, slot: &ChunkSlot, init_image: &[u8]) -> Result<RenderedChunk>;

    /// Extract the exact final frame of a rendered chunk.
    async fn extract_last_frame(&self, video: &[u8]) -> Result<Vec<u8>>;

    /// Progress hook, called after each completed chunk.
    async fn on_chunk_done(&self, _completed: usize, _total: usize) {}
}

/// Parallel-across-groups, sequential-within-group scheduler.
pub struct ChunkScheduler {
    cap: usize,
}

impl ChunkScheduler {
    /// Scheduler with the given cross-group fan-out cap.
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1) }
    }

    /// Run every group, then reassemble by chunk index.
    ///
    /// A failing chunk halts its own group; other groups run to completion.
    /// Any group failure fails the whole run (a stitched video with gaps is
    /// useless), surfacing the error of the earliest failing group.
    pub async fn run_groups(
        &self,
        plan: &ChunkPlan,
        renderer: &dyn ChunkRenderer,
    ) -> Result<Vec<ChunkOutput>> {
        let semaphore = Arc::new(Semaphore::new(self.cap.min(plan.groups.len().max(1))));
        let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let total = plan.total_chunks;

        let group_futures = plan.groups.iter().map(|group| {
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("chunk scheduler semaphore closed");
                run_group(group, renderer, &completed, total).await
            }
        });

        let results: Vec<(usize, Result<Vec<ChunkOutput>>)> = join_all(group_futures)
            .await
            .into_iter()
            .enumerate()
            .collect();

        let mut outputs = Vec::with_capacity(total);
        let mut first_error: Option<(usize, StageError)> = None;
        for (group_index, result) in results {
            match result {
                Ok(mut group_outputs) => outputs.append(&mut group_outputs),
                Err(e) => {
                    if first_error.as_ref().map(|(i, _)| group_index < *i).unwrap_or(true) {
                        first_error = Some((group_index, e));
                    }
                }
            }
        }
        if let Some((_, e)) = first_error {
            return Err(e);
        }

        outputs.sort_by_key(|o| o.slot.index);
        for (i, output) in outputs.iter().enumerate() {
            if output.slot.index != i {
                return Err(StageError::Validation(format!(
                    "chunk index gap: expected {i}, found {}",
                    output.slot.index
                )));
            }
        }
        Ok(outputs)
    }
}

/// Render one group's linear chain.
async fn run_group(
    group: &ChunkGroup,
    renderer: &dyn ChunkRenderer,
    completed: &std::sync::atomic::AtomicUsize,
    total: usize,
) -> Result<Vec<ChunkOutput>> {
    let head = group.head();
    debug!(
        head_index = head.index,
        beat = head.beat_index,
        len = group.chunks.len(),
        "Rendering chunk group"
    );

    let mut init = renderer.reference_image(head.beat_index).await?;
    let mut outputs = Vec::with_capacity(group.chunks.len());
    for (offset, slot) in group.chunks.iter().enumerate() {
        let rendered = renderer.render(slot, &init).await?;
        let done = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        renderer.on_chunk_done(done, total).await;

        let has_successor = offset + 1 < group.chunks.len();
        let last_frame = if has_successor {
            let frame = renderer.extract_last_frame(&rendered.video).await?;
            init = frame.clone();
            Some(frame)
        } else {
            None
        };
        outputs.push(ChunkOutput {
            slot: slot.clone(),
            video: rendered.video,
            cost_usd: rendered.cost_usd,
            last_frame,
        });
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Beat, ModelRegistry, VideoSpec};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestRenderer {
        /// Indexes that fail when rendered.
        fail_on: Vec<usize>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        renders: Mutex<Vec<(usize, Vec<u8>)>>,
    }

    impl TestRenderer {
        fn new() -> Self {
            Self {
                fail_on: vec![],
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                renders: Mutex::new(vec![]),
            }
        }

        fn failing_on(mut self, index: usize) -> Self {
            self.fail_on.push(index);
            self
        }
    }

    #[async_trait]
    impl ChunkRenderer for TestRenderer {
        async fn reference_image(&self, beat_index: usize) -> Result<Vec<u8>> {
            Ok(format!("REF:{beat_index}").into_bytes())
        }

        async fn render(&self, slot: &ChunkSlot, init_image: &[u8]) -> Result<RenderedChunk> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.contains(&slot.index) {
                return Err(StageError::Validation(format!("chunk {} failed", slot.index)));
            }
            let video = format!(
                "VID:{}:init={}",
                slot.index,
                String::from_utf8_lossy(init_image)
            )
            .into_bytes();
            self.renders.lock().push((slot.index, video.clone()));
            Ok(RenderedChunk {
                video,
                cost_usd: 0.25,
            })
        }

        async fn extract_last_frame(&self, video: &[u8]) -> Result<Vec<u8>> {
            Ok(format!("FRAME({})", String::from_utf8_lossy(video)).into_bytes())
        }
    }

    fn plan(beat_durations: &[u32]) -> ChunkPlan {
        let mut beats = Vec::new();
        let mut start = 0;
        for (i, &d) in beat_durations.iter().enumerate() {
            beats.push(Beat {
                index: i,
                start_s: start,
                duration_s: d,
                shot_type: "wide".to_string(),
                action: "a".to_string(),
                prompt: format!("beat {i}"),
                image_url: None,
            });
            start += d;
        }
        let spec = VideoSpec {
            duration_s: start,
            archetype: "product_showcase".to_string(),
            beats,
            style: Default::default(),
            product: Default::default(),
            audio: Default::default(),
        };
        ChunkPlan::derive(&spec, ModelRegistry.require("hailuo_fast").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_outputs_ordered_by_index() {
        let plan = plan(&[10, 15, 5]);
        let renderer = TestRenderer::new();
        let outputs = ChunkScheduler::new(4).run_groups(&plan, &renderer).await.unwrap();
        assert_eq!(outputs.len(), 6);
        for (i, out) in outputs.iter().enumerate() {
            assert_eq!(out.slot.index, i);
            // The renderer's per-chunk charge rides along unchanged.
            assert_eq!(out.cost_usd, 0.25);
        }
    }

    #[tokio::test]
    async fn test_continuations_consume_predecessor_frames() {
        let plan = plan(&[10, 15, 5]);
        let renderer = TestRenderer::new();
        let outputs = ChunkScheduler::new(4).run_groups(&plan, &renderer).await.unwrap();

        // Chunk 1 continues chunk 0: its init is the frame of chunk 0's video.
        let chunk1 = String::from_utf8_lossy(&outputs[1].video).into_owned();
        assert!(chunk1.contains("init=FRAME(VID:0:init=REF:0)"), "{chunk1}");
        // Chunk 4 continues chunk 3 inside beat 1's group.
        let chunk4 = String::from_utf8_lossy(&outputs[4].video).into_owned();
        assert!(chunk4.contains("init=FRAME(VID:3:"), "{chunk4}");
        // Group heads consume reference images.
        let chunk2 = String::from_utf8_lossy(&outputs[2].video).into_owned();
        assert!(chunk2.contains("init=REF:1"), "{chunk2}");
    }

    #[tokio::test]
    async fn test_last_frames_present_iff_successor() {
        let plan = plan(&[10, 15, 5]);
        let renderer = TestRenderer::new();
        let outputs = ChunkScheduler::new(4).run_groups(&plan, &renderer).await.unwrap();
        // Groups: [0,1], [2,3,4], [5].
        let with_frames: Vec<usize> = outputs
            .iter()
            .filter(|o| o.last_frame.is_some())
            .map(|o| o.slot.index)
            .collect();
        assert_eq!(with_frames, vec![0, 2, 3]);
    }

    #[tokio::test]
    async fn test_fan_out_cap_respected() {
        let plan = plan(&[5, 5, 5, 5, 5, 5]); // six single-chunk groups
        let renderer = TestRenderer::new();
        ChunkScheduler::new(2).run_groups(&plan, &renderer).await.unwrap();
        assert!(renderer.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failed_chunk_fails_run_but_not_other_groups() {
        let plan = plan(&[10, 15, 5]);
        let renderer = TestRenderer::new().failing_on(3);
        let err = ChunkScheduler::new(4).run_groups(&plan, &renderer).await.unwrap_err();
        assert!(matches!(err, StageError::Validation(_)));
        // Other groups ran to completion: chunks 0, 1 and 5 rendered; chunk 4
        // (after the failure in its group) did not.
        let rendered: Vec<usize> = renderer.renders.lock().iter().map(|(i, _)| *i).collect();
        assert!(rendered.contains(&0));
        assert!(rendered.contains(&1));
        assert!(rendered.contains(&5));
        assert!(!rendered.contains(&4));
    }
}
