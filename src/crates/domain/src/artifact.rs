//! Artifact kinds and the canonical blob path codec.
//!
//! Every blob-backed artifact lives at
//! `{user}/videos/{job}/{branch}/{checkpoint}/{kind}/{key}_v{version}.{ext}`.
//! The path is deterministically reconstructible from the artifact row, and
//! parsing a path recovers every component (the round trip is bijective).

use crate::error::{DomainError, Result};
use crate::ids::{CheckpointId, JobId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The typed output kinds a stage can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Spec,
    BeatImage,
    Chunk,
    StitchedVideo,
    Music,
    FinalVideo,
    BeatLastFrame,
}

impl ArtifactKind {
    /// All kinds, for iteration in tests and GC.
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Spec,
        ArtifactKind::BeatImage,
        ArtifactKind::Chunk,
        ArtifactKind::StitchedVideo,
        ArtifactKind::Music,
        ArtifactKind::FinalVideo,
        ArtifactKind::BeatLastFrame,
    ];

    /// Path/DB segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Spec => "spec",
            ArtifactKind::BeatImage => "beat_image",
            ArtifactKind::Chunk => "chunk",
            ArtifactKind::StitchedVideo => "stitched_video",
            ArtifactKind::Music => "music",
            ArtifactKind::FinalVideo => "final_video",
            ArtifactKind::BeatLastFrame => "beat_last_frame",
        }
    }

    /// File extension for blobs of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Spec => "json",
            ArtifactKind::BeatImage | ArtifactKind::BeatLastFrame => "png",
            ArtifactKind::Chunk | ArtifactKind::StitchedVideo | ArtifactKind::FinalVideo => "mp4",
            ArtifactKind::Music => "mp3",
        }
    }

    /// Content type served for blobs of this kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Spec => "application/json",
            ArtifactKind::BeatImage | ArtifactKind::BeatLastFrame => "image/png",
            ArtifactKind::Chunk | ArtifactKind::StitchedVideo | ArtifactKind::FinalVideo => {
                "video/mp4"
            }
            ArtifactKind::Music => "audio/mpeg",
        }
    }

    /// Artifact key for an indexed kind, e.g. `beat_03`, `chunk_07`.
    pub fn indexed_key(&self, index: usize) -> String {
        match self {
            ArtifactKind::BeatImage | ArtifactKind::BeatLastFrame => format!("beat_{index:02}"),
            ArtifactKind::Chunk => format!("chunk_{index:02}"),
            _ => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spec" => Ok(ArtifactKind::Spec),
            "beat_image" => Ok(ArtifactKind::BeatImage),
            "chunk" => Ok(ArtifactKind::Chunk),
            "stitched_video" => Ok(ArtifactKind::StitchedVideo),
            "music" => Ok(ArtifactKind::Music),
            "final_video" => Ok(ArtifactKind::FinalVideo),
            "beat_last_frame" => Ok(ArtifactKind::BeatLastFrame),
            other => Err(DomainError::InvalidValue {
                kind: "artifact kind",
                value: other.to_string(),
            }),
        }
    }
}

/// The fully-resolved storage location of one artifact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobPath {
    pub user: UserId,
    pub job: JobId,
    pub branch: String,
    pub checkpoint: CheckpointId,
    pub kind: ArtifactKind,
    pub key: String,
    pub version: u32,
}

impl BlobPath {
    /// Render the canonical path string.
    pub fn render(&self) -> String {
        format!(
            "{}/videos/{}/{}/{}/{}/{}_v{}.{}",
            self.user,
            self.job,
            self.branch,
            self.checkpoint,
            self.kind,
            self.key,
            self.version,
            self.kind.extension()
        )
    }

    /// Parse a canonical path back into its components.
    pub fn parse(path: &str) -> Result<BlobPath> {
        let malformed = || DomainError::MalformedBlobPath(path.to_string());
        let parts: Vec<&str> = path.split('/').collect();
        let [user, marker, job, branch, checkpoint, kind, file] = parts[..] else {
            return Err(malformed());
        };
        if marker != "videos" {
            return Err(malformed());
        }
        let kind: ArtifactKind = kind.parse().map_err(|_| malformed())?;
        let stem = file
            .strip_suffix(&format!(".{}", kind.extension()))
            .ok_or_else(malformed)?;
        let (key, version) = stem.rsplit_once("_v").ok_or_else(malformed)?;
        if key.is_empty() {
            return Err(malformed());
        }
        let version: u32 = version.parse().map_err(|_| malformed())?;
        if version == 0 {
            return Err(malformed());
        }
        Ok(BlobPath {
            user: UserId::from(user),
            job: JobId::from(job),
            branch: branch.to_string(),
            checkpoint: CheckpointId::from(checkpoint),
            kind,
            key: key.to_string(),
            version,
        })
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(kind: ArtifactKind, key: &str, version: u32) -> BlobPath {
        BlobPath {
            user: UserId::from("user-1"),
            job: JobId::from("job-1"),
            branch: "main-1".to_string(),
            checkpoint: CheckpointId::from("cp-1"),
            kind,
            key: key.to_string(),
            version,
        }
    }

    #[test]
    fn test_render_matches_grammar() {
        let p = path(ArtifactKind::Chunk, "chunk_03", 2);
        assert_eq!(
            p.render(),
            "user-1/videos/job-1/main-1/cp-1/chunk/chunk_03_v2.mp4"
        );
    }

    #[test]
    fn test_roundtrip_is_bijective_across_kinds() {
        for kind in ArtifactKind::ALL {
            for version in [1u32, 2, 17] {
                let p = path(kind, &kind.indexed_key(3), version);
                let parsed = BlobPath::parse(&p.render()).unwrap();
                assert_eq!(parsed, p);
                assert_eq!(parsed.render(), p.render());
            }
        }
    }

    #[test]
    fn test_key_with_embedded_version_marker_roundtrips() {
        // rsplit_once keeps keys containing "_v" intact.
        let p = path(ArtifactKind::Spec, "spec_v_custom", 3);
        let parsed = BlobPath::parse(&p.render()).unwrap();
        assert_eq!(parsed.key, "spec_v_custom");
        assert_eq!(parsed.version, 3);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "user-1/videos/job-1/main/cp-1/chunk/chunk_03.mp4",
            "user-1/videos/job-1/main/cp-1/chunk/chunk_03_v0.mp4",
            "user-1/videos/job-1/main/cp-1/chunk/chunk_03_v2.png",
            "user-1/videos/job-1/main/cp-1/rocket/chunk_03_v2.mp4",
            "user-1/clips/job-1/main/cp-1/chunk/chunk_03_v2.mp4",
            "user-1/videos/job-1/chunk/chunk_03_v2.mp4",
            "",
        ] {
            assert!(BlobPath::parse(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn test_indexed_keys() {
        assert_eq!(ArtifactKind::BeatImage.indexed_key(3), "beat_03");
        assert_eq!(ArtifactKind::Chunk.indexed_key(12), "chunk_12");
        assert_eq!(ArtifactKind::Spec.indexed_key(0), "spec");
    }

    #[test]
    fn test_kind_string_roundtrip() {
        for kind in ArtifactKind::ALL {
            assert_eq!(kind.as_str().parse::<ArtifactKind>().unwrap(), kind);
        }
    }
}
