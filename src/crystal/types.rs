//! Crystal data model: a compressed, provenance-tracked synthesis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a crystal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrystalId(String);

impl CrystalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CrystalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CrystalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CrystalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A source a crystal compresses: either a raw mark (level 0) or a lower
/// crystal (level N, N>=1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    Mark(String),
    Crystal(CrystalId),
}

impl SourceRef {
    pub fn as_str(&self) -> &str {
        match self {
            SourceRef::Mark(s) => s,
            SourceRef::Crystal(id) => id.as_str(),
        }
    }
}

/// Crystal level: 0=SESSION, 1=DAY, 2=WEEK, 3=EPOCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Level {
    Session = 0,
    Day = 1,
    Week = 2,
    Epoch = 3,
}

impl Level {
    pub fn below(self) -> Option<Level> {
        match self {
            Level::Session => None,
            Level::Day => Some(Level::Session),
            Level::Week => Some(Level::Day),
            Level::Epoch => Some(Level::Week),
        }
    }
}

/// Structured affective vector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Mood {
    pub valence: f32,
    pub arousal: f32,
    pub confidence: f32,
}

/// What a compression dropped, disclosed honestly under the WARMTH rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Honesty {
    pub dropped_count: usize,
    pub semantic_distance_estimate: f32,
    /// Phrased as "some X were compressed", never "you missed Y" (WARMTH).
    pub disclosure: String,
    /// Set when the compression ratio target was not achieved.
    pub undershoot: bool,
}

impl Honesty {
    pub fn disclose(dropped_count: usize, semantic_distance_estimate: f32, undershoot: bool) -> Self {
        let disclosure = if dropped_count == 0 {
            "nothing was compressed away".to_string()
        } else {
            format!(
                "some {dropped_count} source{} were compressed into this synthesis",
                if dropped_count == 1 { "" } else { "s" }
            )
        };
        Self {
            dropped_count,
            semantic_distance_estimate,
            disclosure,
            undershoot,
        }
    }
}

/// A compressed synthesis of a bounded set of lower-level sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crystal {
    pub id: CrystalId,
    pub level: Level,
    pub insight: String,
    pub significance: String,
    pub topics: Vec<String>,
    pub principles: Vec<String>,
    pub mood: Mood,
    pub source_ids: Vec<SourceRef>,
    pub crystallized_at: DateTime<Utc>,
    pub time_range: (DateTime<Utc>, DateTime<Utc>),
    pub confidence: f32,
    pub token_estimate: u64,
    pub compression_ratio: f32,
    pub honesty: Honesty,
}

impl Crystal {
    /// Whether `self` satisfies the provenance invariant: every
    /// `source_ids` entry must be a mark iff level==Session, else a crystal
    /// at exactly `level.below()`.
    pub fn sources_are_level_consistent(&self, level_of: impl Fn(&CrystalId) -> Option<Level>) -> bool {
        match self.level {
            Level::Session => self
                .source_ids
                .iter()
                .all(|s| matches!(s, SourceRef::Mark(_))),
            higher => {
                let Some(expected) = higher.below() else {
                    return false;
                };
                self.source_ids.iter().all(|s| match s {
                    SourceRef::Crystal(id) => level_of(id) == Some(expected),
                    SourceRef::Mark(_) => false,
                })
            }
        }
    }
}
