//! Error types for domain validation and parsing.

use thiserror::Error;

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors produced by domain validation and parsing.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A beat carries a duration outside the allowed set.
    #[error("Invalid beat duration {duration}s at beat {index}: must be 5, 10 or 15")]
    InvalidBeatDuration { index: usize, duration: u32 },

    /// Beats are not contiguous.
    #[error("Beat {index} starts at {actual}s, expected {expected}s")]
    NonContiguousBeats {
        index: usize,
        expected: u32,
        actual: u32,
    },

    /// The spec declares no beats at all.
    #[error("Spec contains no beats")]
    EmptySpec,

    /// An archetype outside the closed library.
    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    /// A video model tag outside the registry.
    #[error("Unknown video model: {0}")]
    UnknownModel(String),

    /// A string does not parse as the expected enum.
    #[error("Invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    /// A blob path that does not follow the canonical grammar.
    #[error("Malformed blob path: {0}")]
    MalformedBlobPath(String),

    /// Spec JSON that does not deserialize into the typed model.
    #[error("Spec deserialization failed: {0}")]
    SpecDeserialization(#[from] serde_json::Error),
}
