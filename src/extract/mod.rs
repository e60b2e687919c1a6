// Copyright 2025 Cowboy AI, LLC.

//! Entity and relationship extraction (Compute)
//!
//! Extractors are pure and deterministic: file content in, entities and
//! relationships out. They never touch stores; the orchestrator is
//! responsible for write ordering. The registry makes extractors
//! pluggable by language and file type.

mod code;
mod document;

pub use code::CodeExtractor;
pub use document::DocumentExtractor;

use crate::entity::Entity;
use crate::errors::NodeResult;
use crate::relationship::Relationship;
use chrono::{DateTime, Utc};

/// A file handed to an extractor
#[derive(Debug, Clone)]
pub struct ExtractionInput<'a> {
    /// Project the file belongs to
    pub project: &'a str,
    /// Relative path within the project
    pub relative_path: &'a str,
    /// Declared language
    pub language: &'a str,
    /// File content
    pub content: &'a str,
    /// Timestamp stamped on produced entities
    pub observed_at: DateTime<Utc>,
}

/// Entities and relationships produced from one file
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Extracted entities
    pub entities: Vec<Entity>,
    /// Extracted relationships; endpoints are either in `entities` or
    /// pre-existing in the graph
    pub relationships: Vec<Relationship>,
}

/// Drop duplicate entities and relationships produced by repeated
/// declarations; the retained keys match what the graph store merges on
pub(crate) fn dedupe_output(output: &mut ExtractionOutput) {
    let mut seen_entities = std::collections::HashSet::new();
    output
        .entities
        .retain(|e| seen_entities.insert(e.entity_id.clone()));
    let mut seen_edges = std::collections::HashSet::new();
    output
        .relationships
        .retain(|r| seen_edges.insert(r.merge_key()));
}

/// A pluggable, deterministic extractor
pub trait EntityExtractor: Send + Sync {
    /// Extractor name, for logging
    fn name(&self) -> &'static str;

    /// Whether this extractor handles the given language
    fn supports(&self, language: &str) -> bool;

    /// Extract entities and relationships from one file
    fn extract(&self, input: &ExtractionInput<'_>) -> NodeResult<ExtractionOutput>;
}

/// Registry of extractors, consulted in registration order
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn EntityExtractor>>,
}

impl ExtractorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in registry: code plus document extraction
    pub fn with_builtins() -> Self {
        Self::new()
            .register(CodeExtractor::new())
            .register(DocumentExtractor::new())
    }

    /// Register an extractor
    pub fn register(mut self, extractor: impl EntityExtractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    /// Find the first extractor supporting the language
    pub fn for_language(&self, language: &str) -> Option<&dyn EntityExtractor> {
        self.extractors
            .iter()
            .find(|e| e.supports(language))
            .map(Box::as_ref)
    }

    /// Run the matching extractor; an unsupported language yields an
    /// empty output, not an error
    pub fn extract(&self, input: &ExtractionInput<'_>) -> NodeResult<ExtractionOutput> {
        match self.for_language(input.language) {
            Some(extractor) => extractor.extract(input),
            None => Ok(ExtractionOutput::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(language: &'a str, content: &'a str) -> ExtractionInput<'a> {
        ExtractionInput {
            project: "proj",
            relative_path: "src/sample.py",
            language,
            content,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn registry_routes_by_language() {
        let registry = ExtractorRegistry::with_builtins();
        assert_eq!(registry.for_language("python").unwrap().name(), "code");
        assert_eq!(registry.for_language("markdown").unwrap().name(), "document");
        assert!(registry.for_language("binary").is_none());
    }

    #[test]
    fn unsupported_language_yields_empty_output() {
        let registry = ExtractorRegistry::with_builtins();
        let output = registry.extract(&input("binary", "\u{0}\u{1}")).unwrap();
        assert!(output.entities.is_empty());
        assert!(output.relationships.is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let registry = ExtractorRegistry::with_builtins();
        let content = "import os\n\ndef f():\n    pass\n";
        let at = Utc::now();
        let mut a = input("python", content);
        let mut b = input("python", content);
        a.observed_at = at;
        b.observed_at = at;
        let out_a = registry.extract(&a).unwrap();
        let out_b = registry.extract(&b).unwrap();
        assert_eq!(out_a.entities, out_b.entities);
        assert_eq!(out_a.relationships, out_b.relationships);
    }
}
