// Copyright 2025 Cowboy AI, LLC.

//! Language-agnostic structural code extractor
//!
//! Line-oriented and regex-driven: it recognizes top-level functions,
//! classes, and import statements across the common languages without
//! parsing them. Dedicated AST extractors plug in through the registry
//! when deeper structure is needed.

use crate::entity::{Entity, EntityKind};
use crate::relationship::{Relationship, RelationshipKind};
use regex::Regex;
use std::sync::OnceLock;

use super::{EntityExtractor, ExtractionInput, ExtractionOutput};

const SUPPORTED: &[&str] = &[
    "python", "rust", "javascript", "typescript", "go", "java", "ruby", "kotlin", "scala",
];

fn function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:pub(?:\([a-z]+\))?\s+)?(?:export\s+)?(?:async\s+)?(?:def|fn|func|function)\s+([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("function regex")
    })
}

fn type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:pub(?:\([a-z]+\))?\s+)?(?:export\s+)?(?:abstract\s+)?(class|struct|enum|trait|interface)\s+([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("type regex")
    })
}

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^(?:import\s+([A-Za-z_][A-Za-z0-9_./:-]*)|from\s+([A-Za-z_][A-Za-z0-9_.]*)\s+import|use\s+([A-Za-z_][A-Za-z0-9_:]*))"#,
        )
        .expect("import regex")
    })
}

/// Structural extractor for code files
#[derive(Debug, Clone, Default)]
pub struct CodeExtractor;

impl CodeExtractor {
    /// Create the extractor
    pub fn new() -> Self {
        Self
    }
}

impl EntityExtractor for CodeExtractor {
    fn name(&self) -> &'static str {
        "code"
    }

    fn supports(&self, language: &str) -> bool {
        SUPPORTED.contains(&language.to_lowercase().as_str())
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> crate::errors::NodeResult<ExtractionOutput> {
        let module = module_qualifier(input.relative_path);

        let file_entity = Entity::new(
            EntityKind::File,
            input.relative_path,
            module.clone(),
            input.observed_at,
        )
        .with_property("language", input.language)
        .with_property("qualified_name", module.clone());

        let mut output = ExtractionOutput::default();
        let file_id = file_entity.entity_id.clone();
        output.entities.push(file_entity);

        for (index, line) in input.content.lines().enumerate() {
            let line_no = (index + 1) as u32;

            if let Some(captures) = function_regex().captures(line) {
                let name = captures[1].to_string();
                let qualified = format!("{module}.{name}");
                let entity = Entity::new(
                    EntityKind::Function,
                    input.relative_path,
                    qualified.clone(),
                    input.observed_at,
                )
                .with_span(line_no, line_no)
                .with_property("qualified_name", qualified);
                output.relationships.push(Relationship::new(
                    file_id.clone(),
                    entity.entity_id.clone(),
                    RelationshipKind::Defines,
                ));
                output.entities.push(entity);
            } else if let Some(captures) = type_regex().captures(line) {
                let keyword = &captures[1];
                let name = captures[2].to_string();
                let kind = match keyword {
                    "interface" | "trait" => EntityKind::Interface,
                    "enum" => EntityKind::Type,
                    _ => EntityKind::Class,
                };
                let qualified = format!("{module}.{name}");
                let entity = Entity::new(kind, input.relative_path, qualified.clone(), input.observed_at)
                    .with_span(line_no, line_no)
                    .with_property("qualified_name", qualified);
                output.relationships.push(Relationship::new(
                    file_id.clone(),
                    entity.entity_id.clone(),
                    RelationshipKind::Defines,
                ));
                output.entities.push(entity);
            } else if let Some(captures) = import_regex().captures(line) {
                let target = captures
                    .get(1)
                    .or_else(|| captures.get(2))
                    .or_else(|| captures.get(3))
                    .map(|m| m.as_str().to_string());
                if let Some(target) = target {
                    let dependency = Entity::new(
                        EntityKind::Dependency,
                        input.relative_path,
                        target.clone(),
                        input.observed_at,
                    )
                    .with_property("qualified_name", target)
                    .with_confidence(0.8);
                    output.relationships.push(Relationship::new(
                        file_id.clone(),
                        dependency.entity_id.clone(),
                        RelationshipKind::Imports,
                    ));
                    output.entities.push(dependency);
                }
            }
        }

        super::dedupe_output(&mut output);
        Ok(output)
    }
}

fn module_qualifier(relative_path: &str) -> String {
    let stem = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .rsplit_once('.')
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| relative_path.to_string());
    stem
}
