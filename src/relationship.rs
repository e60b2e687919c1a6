// Copyright 2025 Cowboy AI, LLC.

//! Directed relationships between knowledge-graph entities
//!
//! Relationships merge by `(source, target, kind)`; both endpoints must
//! exist before an edge becomes visible to queries. The graph store
//! enforces that ordering, not this module.

use crate::entity::PropertyValue;
use crate::identifiers::EntityKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of relationships between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    /// Source structurally contains target
    Contains,
    /// Source defines target
    Defines,
    /// Source imports target
    Imports,
    /// Source depends on target
    DependsOn,
    /// Source uses target
    Uses,
    /// Source references target
    References,
    /// Source implements target
    Implements,
    /// Source extends target
    Extends,
    /// Source calls target
    Calls,
    /// Source matches a learned pattern
    MatchesPattern,
    /// Source is semantically similar to target
    SimilarTo,
}

impl RelationshipKind {
    /// Stable uppercase tag, the graph store's relationship type
    pub fn as_tag(&self) -> &'static str {
        match self {
            RelationshipKind::Contains => "CONTAINS",
            RelationshipKind::Defines => "DEFINES",
            RelationshipKind::Imports => "IMPORTS",
            RelationshipKind::DependsOn => "DEPENDS_ON",
            RelationshipKind::Uses => "USES",
            RelationshipKind::References => "REFERENCES",
            RelationshipKind::Implements => "IMPLEMENTS",
            RelationshipKind::Extends => "EXTENDS",
            RelationshipKind::Calls => "CALLS",
            RelationshipKind::MatchesPattern => "MATCHES_PATTERN",
            RelationshipKind::SimilarTo => "SIMILAR_TO",
        }
    }

    /// Check if this kind expresses structural ownership
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            RelationshipKind::Contains | RelationshipKind::Defines
        )
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// A directed, weighted edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    /// Source entity id
    pub source_id: EntityKey,
    /// Target entity id
    pub target_id: EntityKey,
    /// Relationship kind
    pub kind: RelationshipKind,
    /// Additional properties
    pub properties: BTreeMap<String, PropertyValue>,
    /// Edge weight in [0,1]
    pub weight: f32,
}

impl Relationship {
    /// Create a relationship with full weight
    pub fn new(source_id: EntityKey, target_id: EntityKey, kind: RelationshipKind) -> Self {
        Self {
            source_id,
            target_id,
            kind,
            properties: BTreeMap::new(),
            weight: 1.0,
        }
    }

    /// Set the edge weight, clamped to [0,1]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.properties.insert(key.into(), value);
        }
        self
    }

    /// Merge identity: duplicates with the same triple must not occur
    pub fn merge_key(&self) -> (EntityKey, EntityKey, RelationshipKind) {
        (self.source_id.clone(), self.target_id.clone(), self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> EntityKey {
        EntityKey::from_string(s)
    }

    #[test]
    fn tags_match_graph_relationship_types() {
        assert_eq!(RelationshipKind::DependsOn.as_tag(), "DEPENDS_ON");
        assert_eq!(RelationshipKind::MatchesPattern.as_tag(), "MATCHES_PATTERN");
        assert_eq!(RelationshipKind::SimilarTo.to_string(), "SIMILAR_TO");
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&RelationshipKind::DependsOn).unwrap();
        assert_eq!(json, "\"DEPENDS_ON\"");
        let back: RelationshipKind = serde_json::from_str("\"SIMILAR_TO\"").unwrap();
        assert_eq!(back, RelationshipKind::SimilarTo);
    }

    #[test]
    fn weight_is_clamped() {
        let rel = Relationship::new(key("a"), key("b"), RelationshipKind::Calls).with_weight(2.0);
        assert_eq!(rel.weight, 1.0);
    }

    #[test]
    fn merge_key_identifies_duplicates() {
        let a = Relationship::new(key("a"), key("b"), RelationshipKind::Uses);
        let b = Relationship::new(key("a"), key("b"), RelationshipKind::Uses).with_weight(0.5);
        assert_eq!(a.merge_key(), b.merge_key());

        let c = Relationship::new(key("a"), key("b"), RelationshipKind::Calls);
        assert_ne!(a.merge_key(), c.merge_key());
    }

    #[test]
    fn structural_classification() {
        assert!(RelationshipKind::Contains.is_structural());
        assert!(!RelationshipKind::Calls.is_structural());
    }
}
