//! Real FFmpeg implementation of the media operations.
//!
//! Inputs land in a per-operation scratch directory under the configured
//! work dir; the directory is removed when the operation finishes. Command
//! argv construction is split out so tests can assert the exact flags
//! without spawning processes.

use super::{Media, MediaError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// FFmpeg-backed media operations.
pub struct FfmpegMedia {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    work_dir: PathBuf,
}

impl FfmpegMedia {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            work_dir: work_dir.into(),
        }
    }

    /// Override the ffmpeg/ffprobe binary locations.
    pub fn with_binaries(mut self, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        self.ffmpeg_bin = ffmpeg.into();
        self.ffprobe_bin = ffprobe.into();
        self
    }

    async fn scratch_dir(&self) -> Result<PathBuf> {
        let dir = self.work_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        debug!(args = ?args, "Running ffmpeg");
        let output = Command::new(&self.ffmpeg_bin).args(args).output().await?;
        if !output.status.success() {
            return Err(MediaError::Ffmpeg {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

/// Argv for extracting the exact final frame (`-sseof -0.04` is one frame
/// from the end at 25 fps).
pub fn last_frame_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-sseof".into(),
        "-0.04".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-frames:v".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Argv for concat-demuxer stitching without re-encoding.
pub fn concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_file.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Argv for muxing music onto the stitched video.
pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        video.to_string_lossy().into_owned(),
        "-i".into(),
        audio.to_string_lossy().into_owned(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-shortest".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Argv for probing a container's declared duration.
pub fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        input.to_string_lossy().into_owned(),
    ]
}

#[async_trait]
impl Media for FfmpegMedia {
    async fn extract_last_frame(&self, video: &[u8]) -> Result<Vec<u8>> {
        let dir = self.scratch_dir().await?;
        let input = dir.join("input.mp4");
        let output = dir.join("last_frame.png");
        tokio::fs::write(&input, video).await?;

        let result = self.run_ffmpeg(&last_frame_args(&input, &output)).await;
        let frame = match result {
            Ok(()) => tokio::fs::read(&output).await.map_err(MediaError::from),
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_dir_all(&dir).await;
        frame
    }

    async fn stitch(&self, chunks: &[Vec<u8>]) -> Result<Vec<u8>> {
        if chunks.is_empty() {
            return Err(MediaError::InvalidOutput("no chunks to stitch".into()));
        }
        let dir = self.scratch_dir().await?;
        let mut list = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let path = dir.join(format!("chunk_{i:02}.mp4"));
            tokio::fs::write(&path, chunk).await?;
            list.push_str(&format!("file '{}'\n", path.display()));
        }
        let list_file = dir.join("list.txt");
        tokio::fs::write(&list_file, list).await?;
        let output = dir.join("stitched.mp4");

        let result = self.run_ffmpeg(&concat_args(&list_file, &output)).await;
        let stitched = match result {
            Ok(()) => tokio::fs::read(&output).await.map_err(MediaError::from),
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_dir_all(&dir).await;
        stitched
    }

    async fn mux_audio(&self, video: &[u8], audio: &[u8]) -> Result<Vec<u8>> {
        let dir = self.scratch_dir().await?;
        let video_path = dir.join("video.mp4");
        let audio_path = dir.join("audio.mp3");
        let output = dir.join("final.mp4");
        tokio::fs::write(&video_path, video).await?;
        tokio::fs::write(&audio_path, audio).await?;

        let result = self.run_ffmpeg(&mux_args(&video_path, &audio_path, &output)).await;
        let muxed = match result {
            Ok(()) => tokio::fs::read(&output).await.map_err(MediaError::from),
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_dir_all(&dir).await;
        muxed
    }

    async fn probe_duration_s(&self, video: &[u8]) -> Result<f64> {
        let dir = self.scratch_dir().await?;
        let input = dir.join("input.mp4");
        tokio::fs::write(&input, video).await?;

        let output = Command::new(&self.ffprobe_bin)
            .args(probe_args(&input))
            .output()
            .await;
        let _ = tokio::fs::remove_dir_all(&dir).await;

        let output = output?;
        if !output.status.success() {
            return Err(MediaError::Ffmpeg {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse()
            .map_err(|_| MediaError::InvalidOutput(format!("ffprobe duration: {text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_frame_args_use_sseof() {
        let args = last_frame_args(Path::new("/w/in.mp4"), Path::new("/w/out.png"));
        assert_eq!(args[1], "-sseof");
        assert_eq!(args[2], "-0.04");
        assert!(args.contains(&"-frames:v".to_string()));
        assert_eq!(args.last().unwrap(), "/w/out.png");
    }

    #[test]
    fn test_concat_args_copy_codec() {
        let args = concat_args(Path::new("/w/list.txt"), Path::new("/w/stitched.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-f concat"));
        assert!(joined.contains("-safe 0"));
        assert!(joined.contains("-c copy"));
    }

    #[test]
    fn test_mux_args_match_refine_contract() {
        let args = mux_args(
            Path::new("/w/v.mp4"),
            Path::new("/w/a.mp3"),
            Path::new("/w/final.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-c:a aac"));
        assert!(joined.contains("-shortest"));
    }

    #[test]
    fn test_probe_args_request_duration_only() {
        let args = probe_args(Path::new("/w/in.mp4"));
        assert!(args.join(" ").contains("format=duration"));
    }
}
