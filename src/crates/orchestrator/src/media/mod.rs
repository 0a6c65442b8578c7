//! FFmpeg-backed media operations.
//!
//! The pipeline needs four operations: extract the exact final frame of a
//! chunk, concatenate chunks with the concat demuxer, mux a music track onto
//! the stitched video, and probe a duration. All are modeled behind the
//! [`Media`] trait so stage logic is testable without an ffmpeg binary; the
//! real implementation shells out via `tokio::process`.

pub mod ffmpeg;
pub mod mock;

pub use ffmpeg::FfmpegMedia;
pub use mock::MockMedia;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by media operations.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Ffmpeg { status: i32, stderr: String },

    #[error("Invalid media output: {0}")]
    InvalidOutput(String),
}

/// Result type for media operations.
pub type Result<T> = std::result::Result<T, MediaError>;

/// Media operations the stages depend on.
#[async_trait]
pub trait Media: Send + Sync {
    /// Extract the final frame of a video as PNG bytes.
    async fn extract_last_frame(&self, video: &[u8]) -> Result<Vec<u8>>;

    /// Concatenate chunks, in the given order, into one video.
    async fn stitch(&self, chunks: &[Vec<u8>]) -> Result<Vec<u8>>;

    /// Mux an audio track onto a video (`-c:v copy -c:a aac -shortest`).
    async fn mux_audio(&self, video: &[u8], audio: &[u8]) -> Result<Vec<u8>>;

    /// Declared duration of a video, seconds.
    async fn probe_duration_s(&self, video: &[u8]) -> Result<f64>;
}
