// Copyright 2025 Cowboy AI, LLC.

//! Identifier types for events, traces, chunks, patterns, and entities
//!
//! UUID-backed identifiers are opaque and random; string-backed
//! identifiers are derived deterministically from content so that
//! re-ingestion of identical input produces identical ids.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation ID propagated across every message of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Create a new random correlation ID (workflow root)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "correlation:{}", self.0)
    }
}

/// Causation ID - the message that caused this one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CausationId(pub Uuid);

impl fmt::Display for CausationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "causation:{}", self.0)
    }
}

/// Event ID - unique per envelope, the idempotency key of consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new random event ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event:{}", self.0)
    }
}

/// Trace ID - identifies an execution trace tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TraceId(pub Uuid);

impl TraceId {
    /// Create a new random trace ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace:{}", self.0)
    }
}

/// Pattern ID - identifies a learned execution pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PatternId(pub Uuid);

impl PatternId {
    /// Create a new random pattern ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pattern:{}", self.0)
    }
}

/// Document ID - stable identifier of an ingested document
///
/// Derived from the project and relative path so that re-ingestion of
/// the same file addresses the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct DocumentId(String);

impl DocumentId {
    /// Derive a document ID from project name and relative path
    pub fn derive(project: &str, relative_path: &str) -> Self {
        Self(format!("{project}:{relative_path}"))
    }

    /// Wrap an already-derived document ID
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chunk ID - stable identifier of a document slice
///
/// Derived from the document, the chunk ordinal, and the content hash;
/// identical content in the same position always yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ChunkId(String);

impl ChunkId {
    /// Derive a chunk ID from its document, ordinal, and content hash
    pub fn derive(document: &DocumentId, ordinal: usize, content_hash: &str) -> Self {
        let digest = content_hash.strip_prefix("sha256:").unwrap_or(content_hash);
        let short = &digest[..digest.len().min(16)];
        Self(format!("{document}#{ordinal}:{short}"))
    }

    /// Wrap an already-derived chunk ID
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity key - stable identifier of a graph entity
///
/// Derived from `(path, kind, qualified name)` so that extractors are
/// deterministic and graph merges are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct EntityKey(String);

impl EntityKey {
    /// Derive an entity key from source path, kind tag, and qualified name
    pub fn derive(path: &str, kind: &str, qualified_name: &str) -> Self {
        Self(format!("{path}::{kind}::{qualified_name}"))
    }

    /// Wrap an already-derived entity key
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_identifiers_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
        assert_ne!(EventId::new(), EventId::new());
        assert_ne!(TraceId::new(), TraceId::new());
        assert_ne!(PatternId::new(), PatternId::new());
    }

    #[test]
    fn display_includes_discriminating_prefix() {
        let id = Uuid::new_v4();
        assert!(CorrelationId(id).to_string().starts_with("correlation:"));
        assert!(CausationId(id).to_string().starts_with("causation:"));
        assert!(EventId(id).to_string().starts_with("event:"));
        assert!(TraceId(id).to_string().starts_with("trace:"));
        assert!(PatternId(id).to_string().starts_with("pattern:"));
    }

    #[test]
    fn derived_ids_are_deterministic() {
        let doc = DocumentId::derive("proj", "src/api.py");
        assert_eq!(doc, DocumentId::derive("proj", "src/api.py"));
        assert_ne!(doc, DocumentId::derive("proj", "src/other.py"));

        let chunk = ChunkId::derive(&doc, 3, "sha256:abcdef0123456789abcdef");
        assert_eq!(chunk, ChunkId::derive(&doc, 3, "sha256:abcdef0123456789abcdef"));
        assert_ne!(chunk, ChunkId::derive(&doc, 4, "sha256:abcdef0123456789abcdef"));

        let key = EntityKey::derive("src/api.py", "function", "api.handler");
        assert_eq!(key.as_str(), "src/api.py::function::api.handler");
    }

    #[test]
    fn chunk_id_tolerates_short_hashes() {
        let doc = DocumentId::derive("proj", "a.md");
        let chunk = ChunkId::derive(&doc, 0, "sha256:abcd");
        assert!(chunk.as_str().ends_with(":abcd"));
    }

    #[test]
    fn serde_roundtrip() {
        let key = EntityKey::derive("p", "class", "C");
        let json = serde_json::to_string(&key).unwrap();
        let back: EntityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);

        let corr = CorrelationId::new();
        let json = serde_json::to_string(&corr).unwrap();
        let back: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(corr, back);
    }
}
