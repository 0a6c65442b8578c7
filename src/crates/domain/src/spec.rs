//! The typed video spec produced by the planning phase.
//!
//! The planner returns loosely-typed JSON; this module is the typed form it
//! must fit. JSON remains the on-the-wire and at-rest representation only.

use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Beat durations the libraries allow, in seconds.
pub const ALLOWED_BEAT_DURATIONS: [u32; 3] = [5, 10, 15];

/// One narrative segment of the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Position in the beat sequence, 0-based.
    pub index: usize,
    /// Offset from the start of the video, seconds.
    pub start_s: u32,
    /// Duration in seconds; always one of 5, 10, 15.
    pub duration_s: u32,
    /// Shot type from the beat library (e.g. "close_up", "wide").
    pub shot_type: String,
    /// What happens on screen during the beat.
    pub action: String,
    /// Generation prompt for the beat's storyboard image.
    pub prompt: String,
    /// Storyboard image URL, set by the storyboard phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Visual style directives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleSpec {
    #[serde(default)]
    pub palette: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub camera: Option<String>,
}

/// The advertised product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Audio directives consumed by the refine phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSpec {
    /// Music genre or style prompt.
    #[serde(default)]
    pub music_style: Option<String>,
    #[serde(default)]
    pub tempo: Option<String>,
}

/// The complete specification of one advertisement video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSpec {
    /// Total video duration in seconds.
    pub duration_s: u32,
    /// Archetype chosen from the closed library.
    pub archetype: String,
    /// Narrative beats, contiguous and covering `duration_s`.
    pub beats: Vec<Beat>,
    #[serde(default)]
    pub style: StyleSpec,
    #[serde(default)]
    pub product: ProductSpec,
    #[serde(default)]
    pub audio: AudioSpec,
}

/// Outcome of normalizing a planner-produced spec.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSpec {
    pub spec: VideoSpec,
    /// Number of tail beats dropped because the sum overran `duration_s`.
    pub truncated_beats: usize,
}

impl VideoSpec {
    /// Parse a planner JSON payload into the typed spec.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize back to the JSON storage form.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("VideoSpec serializes infallibly")
    }

    /// Sum of all beat durations.
    pub fn beats_total_s(&self) -> u32 {
        self.beats.iter().map(|b| b.duration_s).sum()
    }

    /// Validate invariants: non-empty, allowed durations, contiguity, and
    /// `sum(duration_s) <= duration_s`.
    pub fn validate(&self) -> Result<()> {
        if self.beats.is_empty() {
            return Err(DomainError::EmptySpec);
        }
        let mut expected_start = 0u32;
        for (i, beat) in self.beats.iter().enumerate() {
            if !ALLOWED_BEAT_DURATIONS.contains(&beat.duration_s) {
                return Err(DomainError::InvalidBeatDuration {
                    index: i,
                    duration: beat.duration_s,
                });
            }
            if beat.start_s != expected_start {
                return Err(DomainError::NonContiguousBeats {
                    index: i,
                    expected: expected_start,
                    actual: beat.start_s,
                });
            }
            expected_start += beat.duration_s;
        }
        if expected_start > self.duration_s {
            // Callers are expected to truncate first; a spec that still
            // overruns here is a planner contract violation.
            return Err(DomainError::NonContiguousBeats {
                index: self.beats.len(),
                expected: self.duration_s,
                actual: expected_start,
            });
        }
        Ok(())
    }

    /// Normalize a planner output: reindex and re-derive start offsets, drop
    /// tail beats that overrun `duration_s`, and reject disallowed
    /// durations as fatal.
    pub fn normalize(mut self) -> Result<NormalizedSpec> {
        if self.beats.is_empty() {
            return Err(DomainError::EmptySpec);
        }
        for (i, beat) in self.beats.iter().enumerate() {
            if !ALLOWED_BEAT_DURATIONS.contains(&beat.duration_s) {
                return Err(DomainError::InvalidBeatDuration {
                    index: i,
                    duration: beat.duration_s,
                });
            }
        }

        let mut kept = Vec::with_capacity(self.beats.len());
        let mut elapsed = 0u32;
        let mut truncated = 0usize;
        for mut beat in self.beats.into_iter() {
            if elapsed + beat.duration_s > self.duration_s {
                truncated += 1;
                continue;
            }
            beat.index = kept.len();
            beat.start_s = elapsed;
            elapsed += beat.duration_s;
            kept.push(beat);
        }
        if kept.is_empty() {
            return Err(DomainError::EmptySpec);
        }
        self.beats = kept;
        let spec = self;
        spec.validate()?;
        Ok(NormalizedSpec {
            spec,
            truncated_beats: truncated,
        })
    }

    /// True once every beat carries a storyboard image URL.
    pub fn storyboard_complete(&self) -> bool {
        self.beats.iter().all(|b| b.image_url.is_some())
    }
}
