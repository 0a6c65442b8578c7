//! Closed archetype and beat libraries the planner composes from.
//!
//! The planner is instructed to pick exactly one archetype and to assemble
//! the beat sequence from these templates; phase-1 validation checks
//! membership against the same data.

use crate::error::{DomainError, Result};
use serde::Serialize;

/// An advertisement archetype: a named narrative shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archetype {
    pub name: &'static str,
    pub description: &'static str,
}

/// A beat template: a shot type with the durations it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeatTemplate {
    pub shot_type: &'static str,
    pub description: &'static str,
}

const ARCHETYPES: &[Archetype] = &[
    Archetype {
        name: "product_showcase",
        description: "Hero shots of the product with escalating detail",
    },
    Archetype {
        name: "problem_solution",
        description: "Establish a frustration, resolve it with the product",
    },
    Archetype {
        name: "testimonial",
        description: "A satisfied user tells the story",
    },
    Archetype {
        name: "lifestyle",
        description: "The product woven into an aspirational scene",
    },
    Archetype {
        name: "unboxing",
        description: "First contact: packaging, reveal, first use",
    },
];

const BEAT_TEMPLATES: &[BeatTemplate] = &[
    BeatTemplate {
        shot_type: "wide",
        description: "Establishing shot, full scene",
    },
    BeatTemplate {
        shot_type: "close_up",
        description: "Product detail filling the frame",
    },
    BeatTemplate {
        shot_type: "action",
        description: "The product in use",
    },
    BeatTemplate {
        shot_type: "reaction",
        description: "A person reacting to the product",
    },
    BeatTemplate {
        shot_type: "logo",
        description: "Brand card with tagline",
    },
];

/// The closed set of archetypes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchetypeLibrary;

impl ArchetypeLibrary {
    pub fn all(&self) -> &'static [Archetype] {
        ARCHETYPES
    }

    /// Validate an archetype name against the library.
    pub fn require(&self, name: &str) -> Result<&'static Archetype> {
        ARCHETYPES
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| DomainError::UnknownArchetype(name.to_string()))
    }

    /// One line per archetype, for embedding into the planner prompt.
    pub fn prompt_listing(&self) -> String {
        ARCHETYPES
            .iter()
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The closed set of beat templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeatLibrary;

impl BeatLibrary {
    pub fn all(&self) -> &'static [BeatTemplate] {
        BEAT_TEMPLATES
    }

    /// True if the shot type exists in the library.
    pub fn contains(&self, shot_type: &str) -> bool {
        BEAT_TEMPLATES.iter().any(|b| b.shot_type == shot_type)
    }

    /// One line per template, for embedding into the planner prompt.
    pub fn prompt_listing(&self) -> String {
        BEAT_TEMPLATES
            .iter()
            .map(|b| format!("- {}: {}", b.shot_type, b.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_archetype_resolves() {
        let lib = ArchetypeLibrary;
        assert_eq!(lib.require("testimonial").unwrap().name, "testimonial");
    }

    #[test]
    fn test_unknown_archetype_rejected() {
        let lib = ArchetypeLibrary;
        assert!(matches!(
            lib.require("infomercial"),
            Err(DomainError::UnknownArchetype(_))
        ));
    }

    #[test]
    fn test_beat_library_membership() {
        let lib = BeatLibrary;
        assert!(lib.contains("close_up"));
        assert!(!lib.contains("drone_orbit"));
    }

    #[test]
    fn test_prompt_listings_cover_all_entries() {
        let listing = ArchetypeLibrary.prompt_listing();
        for archetype in ArchetypeLibrary.all() {
            assert!(listing.contains(archetype.name));
        }
        let listing = BeatLibrary.prompt_listing();
        for template in BeatLibrary.all() {
            assert!(listing.contains(template.shot_type));
        }
    }
}
