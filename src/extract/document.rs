// Copyright 2025 Cowboy AI, LLC.

//! Markdown document extractor
//!
//! Produces a document entity, one entity per section, containment
//! edges, and reference edges for intra-corpus markdown links.

use crate::entity::{Entity, EntityKind};
use crate::relationship::{Relationship, RelationshipKind};
use regex::Regex;
use std::sync::OnceLock;

use super::{EntityExtractor, ExtractionInput, ExtractionOutput};

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\(([^)#][^)]*)\)").expect("link regex"))
}

/// Extractor for prose documents
#[derive(Debug, Clone, Default)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    /// Create the extractor
    pub fn new() -> Self {
        Self
    }
}

impl EntityExtractor for DocumentExtractor {
    fn name(&self) -> &'static str {
        "document"
    }

    fn supports(&self, language: &str) -> bool {
        matches!(language.to_lowercase().as_str(), "markdown" | "md" | "text")
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> crate::errors::NodeResult<ExtractionOutput> {
        let title = input
            .relative_path
            .rsplit('/')
            .next()
            .unwrap_or(input.relative_path)
            .to_string();

        let document = Entity::new(
            EntityKind::Document,
            input.relative_path,
            title.clone(),
            input.observed_at,
        )
        .with_property("qualified_name", title)
        .with_property("language", input.language);

        let mut output = ExtractionOutput::default();
        let document_id = document.entity_id.clone();
        output.entities.push(document);

        for (index, line) in input.content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                let heading = trimmed.trim_start_matches('#').trim();
                if heading.is_empty() {
                    continue;
                }
                let section = Entity::new(
                    EntityKind::Document,
                    input.relative_path,
                    format!("{}#{heading}", input.relative_path),
                    input.observed_at,
                )
                .with_span((index + 1) as u32, (index + 1) as u32)
                .with_property("qualified_name", heading)
                .with_property("section", true);
                output.relationships.push(Relationship::new(
                    document_id.clone(),
                    section.entity_id.clone(),
                    RelationshipKind::Contains,
                ));
                output.entities.push(section);
            }

            for captures in link_regex().captures_iter(line) {
                let target_path = captures[1].trim();
                if target_path.starts_with("http://") || target_path.starts_with("https://") {
                    continue;
                }
                let target = Entity::new(
                    EntityKind::Document,
                    target_path,
                    target_path
                        .rsplit('/')
                        .next()
                        .unwrap_or(target_path)
                        .to_string(),
                    input.observed_at,
                )
                .with_confidence(0.7);
                output.relationships.push(Relationship::new(
                    document_id.clone(),
                    target.entity_id.clone(),
                    RelationshipKind::References,
                ));
                output.entities.push(target);
            }
        }

        super::dedupe_output(&mut output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn extract(content: &str) -> ExtractionOutput {
        DocumentExtractor::new()
            .extract(&ExtractionInput {
                project: "proj",
                relative_path: "docs/guide.md",
                language: "markdown",
                content,
                observed_at: Utc::now(),
            })
            .unwrap()
    }

    #[test]
    fn sections_become_contained_entities() {
        let output = extract("# Intro\ntext\n## Details\nmore\n");
        assert_eq!(output.entities.len(), 3);
        assert_eq!(
            output
                .relationships
                .iter()
                .filter(|r| r.kind == RelationshipKind::Contains)
                .count(),
            2
        );
    }

    #[test]
    fn local_links_become_references() {
        let output = extract("see [setup](docs/setup.md) and [web](https://example.com)\n");
        let refs: Vec<&Relationship> = output
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::References)
            .collect();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].target_id.as_str().contains("docs/setup.md"));
    }

    #[test]
    fn repeated_links_are_deduplicated() {
        let output = extract("[a](x.md)\n[b](x.md)\n");
        assert_eq!(
            output
                .relationships
                .iter()
                .filter(|r| r.kind == RelationshipKind::References)
                .count(),
            1
        );
    }
}
