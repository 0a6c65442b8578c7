//! Deterministic media operations for tests.
//!
//! Outputs are byte-level functions of the inputs so stage tests can assert
//! exact continuation chains and stitch order without an ffmpeg binary.

use super::{Media, MediaError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Mock media backend.
pub struct MockMedia {
    /// Seconds reported per stitched chunk by `probe_duration_s`.
    pub chunk_duration_s: f64,
    fail_stitch: Mutex<bool>,
}

impl MockMedia {
    pub fn new() -> Self {
        Self {
            chunk_duration_s: 5.0,
            fail_stitch: Mutex::new(false),
        }
    }

    /// Script the next stitch call to fail.
    pub fn failing_stitch(self) -> Self {
        *self.fail_stitch.lock() = true;
        self
    }
}

impl Default for MockMedia {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Media for MockMedia {
    async fn extract_last_frame(&self, video: &[u8]) -> Result<Vec<u8>> {
        // Derive a stable frame from the tail of the chunk bytes.
        let tail_len = video.len().min(16);
        let mut frame = b"FRAME|".to_vec();
        frame.extend_from_slice(&video[video.len() - tail_len..]);
        Ok(frame)
    }

    async fn stitch(&self, chunks: &[Vec<u8>]) -> Result<Vec<u8>> {
        if *self.fail_stitch.lock() {
            return Err(MediaError::Ffmpeg {
                status: 1,
                stderr: "scripted stitch failure".to_string(),
            });
        }
        if chunks.is_empty() {
            return Err(MediaError::InvalidOutput("no chunks to stitch".into()));
        }
        let mut out = b"STITCHED|".to_vec();
        out.extend_from_slice(&(chunks.len() as u32).to_be_bytes());
        for chunk in chunks {
            out.extend_from_slice(b"|#|");
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }

    async fn mux_audio(&self, video: &[u8], audio: &[u8]) -> Result<Vec<u8>> {
        let mut out = b"FINAL|".to_vec();
        out.extend_from_slice(video);
        out.extend_from_slice(b"|AUDIO|");
        out.extend_from_slice(audio);
        Ok(out)
    }

    async fn probe_duration_s(&self, video: &[u8]) -> Result<f64> {
        if video.len() < 13 || !video.starts_with(b"STITCHED|") {
            return Err(MediaError::InvalidOutput("not a mock stitched video".into()));
        }
        let count = u32::from_be_bytes([video[9], video[10], video[11], video[12]]);
        Ok(count as f64 * self.chunk_duration_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_frame_tracks_chunk_tail() {
        let media = MockMedia::new();
        let a = media.extract_last_frame(b"MP4|chunk-a-bytes").await.unwrap();
        let b = media.extract_last_frame(b"MP4|chunk-b-bytes").await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(b"FRAME|"));
    }

    #[tokio::test]
    async fn test_stitch_preserves_order_and_count() {
        let media = MockMedia::new();
        let stitched = media
            .stitch(&[b"one".to_vec(), b"two".to_vec(), b"three".to_vec()])
            .await
            .unwrap();
        assert!(stitched.starts_with(b"STITCHED|"));
        assert_eq!(media.probe_duration_s(&stitched).await.unwrap(), 15.0);

        let text = String::from_utf8_lossy(&stitched);
        let one = text.find("one").unwrap();
        let two = text.find("two").unwrap();
        let three = text.find("three").unwrap();
        assert!(one < two && two < three);
    }

    #[tokio::test]
    async fn test_scripted_stitch_failure() {
        let media = MockMedia::new().failing_stitch();
        let err = media.stitch(&[b"x".to_vec()]).await.unwrap_err();
        assert!(matches!(err, MediaError::Ffmpeg { .. }));
    }
}
