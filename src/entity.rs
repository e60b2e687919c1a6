// Copyright 2025 Cowboy AI, LLC.

//! Graph entities extracted from ingested artifacts
//!
//! Entities are the nodes of the knowledge graph. They are immutable
//! once published on the bus; re-ingestion of the same source merges by
//! `entity_id` rather than creating duplicates.

use crate::hashing::signature_hash;
use crate::identifiers::EntityKey;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of entities that can exist in the knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    /// A class or similar type definition
    Class,
    /// A free function or method
    Function,
    /// A module or namespace
    Module,
    /// A variable binding
    Variable,
    /// A named constant
    Constant,
    /// An interface or protocol definition
    Interface,
    /// A type alias or type definition
    Type,
    /// A whole project
    Project,
    /// A package within a project
    Package,
    /// A single file
    File,
    /// An external dependency
    Dependency,
    /// A prose document
    Document,
    /// A learned execution pattern
    Pattern,
    /// A test case or suite
    Test,
    /// A configuration artifact
    Configuration,
}

impl EntityKind {
    /// Stable lowercase tag used when deriving entity keys
    pub fn as_tag(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Function => "function",
            EntityKind::Module => "module",
            EntityKind::Variable => "variable",
            EntityKind::Constant => "constant",
            EntityKind::Interface => "interface",
            EntityKind::Type => "type",
            EntityKind::Project => "project",
            EntityKind::Package => "package",
            EntityKind::File => "file",
            EntityKind::Dependency => "dependency",
            EntityKind::Document => "document",
            EntityKind::Pattern => "pattern",
            EntityKind::Test => "test",
            EntityKind::Configuration => "configuration",
        }
    }

    /// Check if this kind denotes a code unit with a source span
    pub fn is_code_unit(&self) -> bool {
        matches!(
            self,
            EntityKind::Class
                | EntityKind::Function
                | EntityKind::Variable
                | EntityKind::Constant
                | EntityKind::Interface
                | EntityKind::Type
        )
    }

    /// Check if this kind denotes a container of other entities
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            EntityKind::Project
                | EntityKind::Package
                | EntityKind::Module
                | EntityKind::File
                | EntityKind::Document
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// Scalar or array property value attached to entities and relationships
pub type PropertyValue = serde_json::Value;

/// An entity in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    /// Stable identifier, unique across the graph
    pub entity_id: EntityKey,
    /// Entity kind
    pub kind: EntityKind,
    /// Display name (usually the qualified name's last segment)
    pub name: String,
    /// Path of the source artifact this entity came from
    pub source_path: String,
    /// First line of the defining span, when known
    pub line_start: Option<u32>,
    /// Last line of the defining span, when known
    pub line_end: Option<u32>,
    /// Hash of the normalized structural form
    pub signature_hash: String,
    /// Additional properties (string-keyed scalars or arrays)
    pub properties: BTreeMap<String, PropertyValue>,
    /// Extraction confidence in [0,1]
    pub confidence: f32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Build an entity, deriving its id and signature hash from the
    /// normalized structural attributes
    pub fn new(
        kind: EntityKind,
        source_path: impl Into<String>,
        qualified_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let source_path = source_path.into();
        let qualified_name = qualified_name.into();
        let entity_id = EntityKey::derive(&source_path, kind.as_tag(), &qualified_name);
        let signature_hash =
            signature_hash([source_path.as_str(), kind.as_tag(), qualified_name.as_str()]);
        let name = qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&qualified_name)
            .to_string();
        Self {
            entity_id,
            kind,
            name,
            source_path,
            line_start: None,
            line_end: None,
            signature_hash,
            properties: BTreeMap::new(),
            confidence: 1.0,
            created_at,
        }
    }

    /// Set the defining source span
    pub fn with_span(mut self, start: u32, end: u32) -> Self {
        self.line_start = Some(start);
        self.line_end = Some(end);
        self
    }

    /// Set the extraction confidence, clamped to [0,1]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.properties.insert(key.into(), value);
        }
        self
    }

    /// Recompute the signature hash from the current structural
    /// attributes; equality with the stored hash is the invariant
    pub fn computed_signature(&self) -> String {
        let qualified = self
            .properties
            .get("qualified_name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone());
        signature_hash([
            self.source_path.as_str(),
            self.kind.as_tag(),
            qualified.as_str(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn entity_id_is_derived_from_path_kind_and_name() {
        let e = Entity::new(EntityKind::Function, "src/api.py", "api.handler", now());
        assert_eq!(e.entity_id.as_str(), "src/api.py::function::api.handler");
        assert_eq!(e.name, "handler");
    }

    #[test]
    fn identical_input_yields_identical_entity_id_and_signature() {
        let a = Entity::new(EntityKind::Class, "src/m.py", "m.Widget", now());
        let b = Entity::new(EntityKind::Class, "src/m.py", "m.Widget", now());
        assert_eq!(a.entity_id, b.entity_id);
        assert_eq!(a.signature_hash, b.signature_hash);
    }

    #[test]
    fn signature_matches_computed_form() {
        let e = Entity::new(EntityKind::Module, "src/m.py", "m", now());
        assert_eq!(e.signature_hash, e.computed_signature());
    }

    #[test]
    fn confidence_is_clamped() {
        let e = Entity::new(EntityKind::File, "a", "a", now()).with_confidence(1.5);
        assert_eq!(e.confidence, 1.0);
        let e = Entity::new(EntityKind::File, "a", "a", now()).with_confidence(-0.5);
        assert_eq!(e.confidence, 0.0);
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&EntityKind::Function).unwrap();
        assert_eq!(json, "\"FUNCTION\"");
        let back: EntityKind = serde_json::from_str("\"CONFIGURATION\"").unwrap();
        assert_eq!(back, EntityKind::Configuration);
    }

    #[test]
    fn kind_classification_helpers() {
        assert!(EntityKind::Function.is_code_unit());
        assert!(!EntityKind::Document.is_code_unit());
        assert!(EntityKind::Package.is_container());
        assert!(!EntityKind::Constant.is_container());
    }
}
