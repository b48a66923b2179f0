//! Directed edges between memories.

use serde::{Deserialize, Serialize};

/// Labeled relationship between two memories.
///
/// At most one `Link` may exist per `(source, target, relationship)` triple.
/// `Supersedes` additionally sets `superseded_by` on the target memory.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    LedTo,
    Supersedes,
    DependsOn,
    ConflictsWith,
    RelatedTo,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::LedTo => "led_to",
            Relationship::Supersedes => "supersedes",
            Relationship::DependsOn => "depends_on",
            Relationship::ConflictsWith => "conflicts_with",
            Relationship::RelatedTo => "related_to",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "led_to" => Some(Relationship::LedTo),
            "supersedes" => Some(Relationship::Supersedes),
            "depends_on" => Some(Relationship::DependsOn),
            "conflicts_with" => Some(Relationship::ConflictsWith),
            "related_to" => Some(Relationship::RelatedTo),
            _ => None,
        }
    }

    /// Edge weight used by Leiden's undirected projection (graph §4.6).
    pub fn community_weight(&self) -> f64 {
        match self {
            Relationship::Supersedes | Relationship::ConflictsWith => 2.0,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge `source --relationship--> target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub source: i64,
    pub target: i64,
    pub relationship: Relationship,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_roundtrip() {
        for r in [
            Relationship::LedTo,
            Relationship::Supersedes,
            Relationship::DependsOn,
            Relationship::ConflictsWith,
            Relationship::RelatedTo,
        ] {
            assert_eq!(Relationship::parse_name(r.as_str()), Some(r));
        }
        assert_eq!(Relationship::parse_name("bogus"), None);
    }

    #[test]
    fn community_weights_match_spec() {
        assert_eq!(Relationship::Supersedes.community_weight(), 2.0);
        assert_eq!(Relationship::ConflictsWith.community_weight(), 2.0);
        assert_eq!(Relationship::RelatedTo.community_weight(), 1.0);
        assert_eq!(Relationship::DependsOn.community_weight(), 1.0);
        assert_eq!(Relationship::LedTo.community_weight(), 1.0);
    }
}
