use crate::error::{PostlineError, Result};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// One content flavor the channel publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Archetype {
    pub key: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Relative share of this archetype in a full rotation cycle.
    pub cadence_weight: u32,
    /// Brief handed to the generator for this archetype.
    pub guidance: &'static str,
}

pub const DEFAULT_ARCHETYPE: &str = "useful";

pub const ARCHETYPES: &[Archetype] = &[
    Archetype {
        key: "useful",
        display_name: "Useful know-how",
        description: "Educational content: metrics, methods, tricks",
        cadence_weight: 2,
        guidance: "Teach one concrete technique or metric. Explain what it is, \
                   why it matters and how to apply it today, with a worked number.",
    },
    Archetype {
        key: "case",
        display_name: "Case study",
        description: "A real result with BEFORE/AFTER numbers",
        cadence_weight: 1,
        guidance: "Tell a client story: starting point, what was changed, and the \
                   measurable outcome. Always show before and after figures.",
    },
    Archetype {
        key: "interactive",
        display_name: "Opinion & discussion",
        description: "A debatable opinion plus a question to the audience",
        cadence_weight: 1,
        guidance: "State a debatable position, give two arguments for it, and end \
                   with a direct question inviting readers to disagree.",
    },
    Archetype {
        key: "checklist",
        display_name: "Checklist",
        description: "Seven tasks for a month or an event",
        cadence_weight: 1,
        guidance: "Write a checklist of seven short, actionable items tied to an \
                   upcoming period or event.",
    },
    Archetype {
        key: "tools",
        display_name: "Tool review",
        description: "Top three tools with pros and cons",
        cadence_weight: 1,
        guidance: "Compare three tools. For each give one strength, one weakness \
                   and who it suits best.",
    },
    Archetype {
        key: "mistake",
        display_name: "Mistake story",
        description: "Storytelling with tension and a lesson",
        cadence_weight: 1,
        guidance: "Narrate a costly mistake with a setup, the moment it went wrong, \
                   and the lesson the reader can take away.",
    },
    Archetype {
        key: "lifehack",
        display_name: "Lifehack",
        description: "Step-by-step instruction, free and fast",
        cadence_weight: 1,
        guidance: "Give a numbered, step-by-step instruction that costs nothing \
                   and takes under fifteen minutes.",
    },
    Archetype {
        key: "expert_opinion",
        display_name: "Expert opinion",
        description: "Analysis of a change, a forecast and three actions",
        cadence_weight: 1,
        guidance: "Analyse a recent change in the market, forecast its effect, and \
                   recommend three actions.",
    },
];

/// Slot order of one rotation cycle.
pub const ROTATION_SEQUENCE: &[&str] = &["useful", "useful", "case", "interactive"];

// ---------------------------------------------------------------------------
// RotationCatalog
// ---------------------------------------------------------------------------

/// The archetype table together with the cyclic slot sequence drawn from it.
#[derive(Debug, Clone, Copy)]
pub struct RotationCatalog {
    archetypes: &'static [Archetype],
    sequence: &'static [&'static str],
    default_key: &'static str,
}

impl Default for RotationCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl RotationCatalog {
    pub fn standard() -> Self {
        Self {
            archetypes: ARCHETYPES,
            sequence: ROTATION_SEQUENCE,
            default_key: DEFAULT_ARCHETYPE,
        }
    }

    /// Build a catalog from custom tables. The sequence must be non-empty and
    /// every key in it, as well as `default_key`, must name an archetype.
    pub fn new(
        archetypes: &'static [Archetype],
        sequence: &'static [&'static str],
        default_key: &'static str,
    ) -> Result<Self> {
        if sequence.is_empty() {
            return Err(PostlineError::InvalidConfig {
                field: "rotation.sequence".to_string(),
                reason: "must contain at least one slot".to_string(),
            });
        }
        for key in sequence.iter().chain(std::iter::once(&default_key)) {
            if !archetypes.iter().any(|a| a.key == *key) {
                return Err(PostlineError::UnknownArchetype(key.to_string()));
            }
        }
        Ok(Self {
            archetypes,
            sequence,
            default_key,
        })
    }

    pub fn archetypes(&self) -> &'static [Archetype] {
        self.archetypes
    }

    pub fn sequence(&self) -> &'static [&'static str] {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&'static Archetype> {
        self.archetypes.iter().find(|a| a.key == key)
    }

    pub fn default_archetype(&self) -> &'static Archetype {
        // `new` and `standard` both guarantee the default key exists.
        self.get(self.default_key).unwrap_or(&self.archetypes[0])
    }

    /// Archetype due at rotation position `index` (wraps modulo the cycle).
    pub fn slot(&self, index: usize) -> &'static Archetype {
        let key = self.sequence[index % self.sequence.len()];
        self.get(key).unwrap_or_else(|| self.default_archetype())
    }

    /// Resolve a key coming from operator-authored data. Unknown keys fall
    /// back to the default archetype instead of failing.
    pub fn resolve_or_default(&self, key: &str) -> &'static Archetype {
        match self.get(key) {
            Some(a) => a,
            None => {
                tracing::warn!(
                    key,
                    fallback = self.default_key,
                    "unknown archetype in content plan, using default"
                );
                self.default_archetype()
            }
        }
    }
}
