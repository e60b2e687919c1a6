// Copyright 2025 Cowboy AI, LLC.

//! Semantic chunker (Compute)
//!
//! Produces an ordered, non-overlapping sequence of chunks per document.
//! Markdown splits at heading boundaries, code at top-level unit
//! boundaries, and everything else into fixed-size windows. Only
//! generic chunks may overlap, by the configured window.

use crate::chunk::{Chunk, ChunkBoundary, ChunkKind};
use crate::identifiers::DocumentId;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Configuration for the chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Size of generic chunks, in characters
    pub generic_chunk_size: usize,
    /// Overlap between consecutive generic chunks, as a ratio of size
    pub generic_overlap_ratio: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            generic_chunk_size: 1000,
            generic_overlap_ratio: 0.10,
        }
    }
}

/// Languages whose content is chunked at code-unit boundaries
const CODE_LANGUAGES: &[&str] = &[
    "python", "rust", "javascript", "typescript", "go", "java", "c", "cpp", "csharp", "ruby",
    "kotlin", "swift", "scala", "php",
];

/// Whether a declared language is treated as code
pub fn is_code_language(language: &str) -> bool {
    CODE_LANGUAGES.contains(&language.to_lowercase().as_str())
}

/// Deterministic document chunker
#[derive(Debug, Clone, Default)]
pub struct SemanticChunker {
    config: ChunkerConfig,
}

impl SemanticChunker {
    /// Create a chunker with the given configuration
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk a document according to its language
    pub fn chunk(&self, document_id: &DocumentId, content: &str, language: &str) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }
        let language = language.to_lowercase();
        if language == "markdown" || language == "md" {
            self.chunk_markdown(document_id, content)
        } else if CODE_LANGUAGES.contains(&language.as_str()) {
            self.chunk_code(document_id, content)
        } else {
            self.chunk_generic(document_id, content)
        }
    }

    /// Split markdown at heading boundaries; each chunk carries the
    /// heading path from the document root
    pub fn chunk_markdown(&self, document_id: &DocumentId, content: &str) -> Vec<Chunk> {
        let headings = collect_headings(content);

        let mut chunks = Vec::new();
        let mut ordinal = 0;

        // Preamble before the first heading.
        let first_start = headings.first().map(|h| h.offset).unwrap_or(content.len());
        if first_start > 0 {
            let body = &content[..first_start];
            if !body.trim().is_empty() {
                chunks.push(Chunk::new(
                    document_id.clone(),
                    ordinal,
                    body,
                    ChunkKind::MarkdownSection,
                    ChunkBoundary::HeadingPath { path: Vec::new() },
                ));
                ordinal += 1;
            }
        }

        // Heading path is a stack: a heading at level L pops everything
        // at the same or a deeper level before pushing itself.
        let mut path: Vec<(usize, String)> = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            while path.last().is_some_and(|(l, _)| *l >= heading.level) {
                path.pop();
            }
            path.push((heading.level, heading.title.clone()));

            let end = headings
                .get(i + 1)
                .map(|h| h.offset)
                .unwrap_or(content.len());
            let body = &content[heading.offset..end];
            if body.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk::new(
                document_id.clone(),
                ordinal,
                body,
                ChunkKind::MarkdownSection,
                ChunkBoundary::HeadingPath {
                    path: path.iter().map(|(_, t)| t.clone()).collect(),
                },
            ));
            ordinal += 1;
        }

        if chunks.is_empty() {
            // No headings at all: a single section covering the document.
            chunks.push(Chunk::new(
                document_id.clone(),
                0,
                content,
                ChunkKind::MarkdownSection,
                ChunkBoundary::HeadingPath { path: Vec::new() },
            ));
        }
        chunks
    }

    /// Split code at top-level function and class boundaries; decorators
    /// and attributes belong to the unit they annotate
    pub fn chunk_code(&self, document_id: &DocumentId, content: &str) -> Vec<Chunk> {
        let module = module_name(document_id);
        let starts = collect_unit_starts(content);

        if starts.is_empty() {
            return vec![Chunk::new(
                document_id.clone(),
                0,
                content,
                ChunkKind::CodeUnit,
                ChunkBoundary::QualifiedName {
                    name: module.clone(),
                },
            )];
        }

        let mut chunks = Vec::new();
        let mut ordinal = 0;

        // Header (imports, module docstring) before the first unit.
        let first = starts[0].offset;
        if first > 0 && !content[..first].trim().is_empty() {
            chunks.push(Chunk::new(
                document_id.clone(),
                ordinal,
                &content[..first],
                ChunkKind::CodeUnit,
                ChunkBoundary::QualifiedName {
                    name: module.clone(),
                },
            ));
            ordinal += 1;
        }

        for (i, start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map(|s| s.offset).unwrap_or(content.len());
            let body = &content[start.offset..end];
            if body.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk::new(
                document_id.clone(),
                ordinal,
                body,
                ChunkKind::CodeUnit,
                ChunkBoundary::QualifiedName {
                    name: format!("{module}.{}", start.name),
                },
            ));
            ordinal += 1;
        }
        chunks
    }

    /// Fixed-size chunks with a character-level overlap window
    pub fn chunk_generic(&self, document_id: &DocumentId, content: &str) -> Vec<Chunk> {
        let size = self.config.generic_chunk_size.max(1);
        let overlap = ((size as f32) * self.config.generic_overlap_ratio) as usize;
        let stride = size.saturating_sub(overlap).max(1);

        let char_offsets: Vec<usize> = content
            .char_indices()
            .map(|(byte, _)| byte)
            .chain(std::iter::once(content.len()))
            .collect();
        let total_chars = char_offsets.len() - 1;

        let mut chunks = Vec::new();
        let mut ordinal = 0;
        let mut start_char = 0;
        while start_char < total_chars {
            let end_char = (start_char + size).min(total_chars);
            let start_byte = char_offsets[start_char];
            let end_byte = char_offsets[end_char];
            chunks.push(Chunk::new(
                document_id.clone(),
                ordinal,
                &content[start_byte..end_byte],
                ChunkKind::Generic,
                ChunkBoundary::ByteRange {
                    start: start_byte,
                    end: end_byte,
                },
            ));
            ordinal += 1;
            if end_char == total_chars {
                break;
            }
            start_char += stride;
        }
        chunks
    }
}

struct Heading {
    offset: usize,
    level: usize,
    title: String,
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn collect_headings(content: &str) -> Vec<Heading> {
    let parser = Parser::new_ext(content, Options::empty());
    let mut headings = Vec::new();
    let mut current: Option<Heading> = None;

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(Heading {
                    offset: range.start,
                    level: heading_depth(level),
                    title: String::new(),
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = current.as_mut() {
                    heading.title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut heading) = current.take() {
                    heading.title = heading.title.trim().to_string();
                    headings.push(heading);
                }
            }
            _ => {}
        }
    }
    headings
}

struct UnitStart {
    offset: usize,
    name: String,
}

fn unit_regex() -> &'static Regex {
    static UNIT: OnceLock<Regex> = OnceLock::new();
    UNIT.get_or_init(|| {
        Regex::new(
            r"^(?:pub(?:\([a-z]+\))?\s+)?(?:export\s+)?(?:async\s+)?(?:def|fn|class|struct|enum|trait|interface|function)\s+([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("unit start regex")
    })
}

fn annotation_regex() -> &'static Regex {
    static ANNOTATION: OnceLock<Regex> = OnceLock::new();
    ANNOTATION.get_or_init(|| Regex::new(r"^\s*(@[A-Za-z_]|#\[)").expect("annotation regex"))
}

/// Top-level unit start offsets, with decorators and attributes folded
/// into the unit they annotate
fn collect_unit_starts(content: &str) -> Vec<UnitStart> {
    let mut starts = Vec::new();
    let mut offset = 0;
    let mut pending_annotation: Option<usize> = None;

    for line in content.split_inclusive('\n') {
        let trimmed_end = line.trim_end_matches('\n');
        if annotation_regex().is_match(trimmed_end) && !trimmed_end.starts_with(char::is_whitespace)
        {
            pending_annotation.get_or_insert(offset);
        } else if let Some(captures) = unit_regex().captures(trimmed_end) {
            let start = pending_annotation.take().unwrap_or(offset);
            starts.push(UnitStart {
                offset: start,
                name: captures[1].to_string(),
            });
        } else if !trimmed_end.trim().is_empty() {
            pending_annotation = None;
        }
        offset += line.len();
    }
    starts
}

fn module_name(document_id: &DocumentId) -> String {
    let path = document_id.as_str();
    let file = path.rsplit(['/', ':']).next().unwrap_or(path);
    file.rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(path: &str) -> DocumentId {
        DocumentId::derive("proj", path)
    }

    fn chunker() -> SemanticChunker {
        SemanticChunker::default()
    }

    #[test]
    fn markdown_splits_at_headings_with_paths() {
        let content = "intro text\n\n# Guide\nbody one\n\n## Setup\nbody two\n\n# Appendix\nbody three\n";
        let chunks = chunker().chunk_markdown(&doc("README.md"), content);

        assert_eq!(chunks.len(), 4);
        assert_eq!(
            chunks[0].boundary,
            ChunkBoundary::HeadingPath { path: vec![] }
        );
        assert_eq!(
            chunks[1].boundary,
            ChunkBoundary::HeadingPath {
                path: vec!["Guide".into()]
            }
        );
        assert_eq!(
            chunks[2].boundary,
            ChunkBoundary::HeadingPath {
                path: vec!["Guide".into(), "Setup".into()]
            }
        );
        assert_eq!(
            chunks[3].boundary,
            ChunkBoundary::HeadingPath {
                path: vec!["Appendix".into()]
            }
        );

        // Ordered, gap-free coverage.
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, content);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }
    }

    #[test]
    fn markdown_sibling_heading_replaces_path_tail() {
        let content = "# A\nx\n## B\ny\n## C\nz\n";
        let chunks = chunker().chunk_markdown(&doc("d.md"), content);
        assert_eq!(
            chunks[2].boundary,
            ChunkBoundary::HeadingPath {
                path: vec!["A".into(), "C".into()]
            }
        );
    }

    #[test]
    fn markdown_without_headings_is_one_section() {
        let content = "just prose with no headings\n";
        let chunks = chunker().chunk_markdown(&doc("d.md"), content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn code_splits_at_top_level_units() {
        let content = "import os\n\ndef first():\n    \"\"\"doc\"\"\"\n    return 1\n\nclass Widget:\n    def method(self):\n        return 2\n";
        let chunks = chunker().chunk_code(&doc("src/api.py"), content);

        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks[0].boundary,
            ChunkBoundary::QualifiedName { name: "api".into() }
        );
        assert_eq!(
            chunks[1].boundary,
            ChunkBoundary::QualifiedName {
                name: "api.first".into()
            }
        );
        assert!(chunks[1].content.contains("\"\"\"doc\"\"\""));
        assert_eq!(
            chunks[2].boundary,
            ChunkBoundary::QualifiedName {
                name: "api.Widget".into()
            }
        );
        // Nested methods stay inside their class chunk.
        assert!(chunks[2].content.contains("def method"));

        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn decorators_belong_to_their_unit() {
        let content = "import x\n\n@route(\"/a\")\n@cached\ndef handler():\n    pass\n";
        let chunks = chunker().chunk_code(&doc("src/api.py"), content);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].content.starts_with("@route"));
        assert!(chunks[1].content.contains("def handler"));
    }

    #[test]
    fn rust_attributes_belong_to_their_unit() {
        let content = "use std::fmt;\n\n#[derive(Debug)]\npub struct Config {\n    a: u32,\n}\n\npub fn load() {}\n";
        let chunks = chunker().chunk_code(&doc("src/config.rs"), content);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].content.starts_with("#[derive(Debug)]"));
        assert_eq!(
            chunks[2].boundary,
            ChunkBoundary::QualifiedName {
                name: "config.load".into()
            }
        );
    }

    #[test]
    fn generic_chunks_have_configured_overlap() {
        let config = ChunkerConfig {
            generic_chunk_size: 10,
            generic_overlap_ratio: 0.2,
        };
        let content = "abcdefghijklmnopqrstuvwxyz";
        let chunks = SemanticChunker::new(config).chunk_generic(&doc("notes.txt"), content);

        assert_eq!(chunks[0].content, "abcdefghij");
        // Stride 8: the next chunk starts 2 characters inside the previous.
        assert_eq!(chunks[1].content, "ijklmnopqr");
        assert_eq!(chunks.last().unwrap().content.chars().last(), Some('z'));
    }

    #[test]
    fn chunking_is_deterministic() {
        let content = "# A\nbody\n## B\nmore\n";
        let a = chunker().chunk(&doc("d.md"), content, "markdown");
        let b = chunker().chunk(&doc("d.md"), content, "markdown");
        assert_eq!(a, b);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.chunk_id, y.chunk_id);
        }
    }

    #[test]
    fn language_selects_strategy() {
        let c = chunker();
        let d = doc("f");
        assert_eq!(
            c.chunk(&d, "# t\nbody", "markdown")[0].kind,
            ChunkKind::MarkdownSection
        );
        assert_eq!(
            c.chunk(&d, "def f():\n    pass\n", "python")[0].kind,
            ChunkKind::CodeUnit
        );
        assert_eq!(c.chunk(&d, "plain text", "text")[0].kind, ChunkKind::Generic);
        assert!(c.chunk(&d, "", "text").is_empty());
    }

    proptest::proptest! {
        #[test]
        fn generic_chunking_covers_any_input(content in ".{0,400}") {
            let config = ChunkerConfig {
                generic_chunk_size: 50,
                generic_overlap_ratio: 0.0,
            };
            let chunks = SemanticChunker::new(config).chunk_generic(&doc("any"), &content);
            let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
            proptest::prop_assert_eq!(rebuilt, content);
            for (i, chunk) in chunks.iter().enumerate() {
                proptest::prop_assert_eq!(chunk.ordinal, i);
            }
        }

        #[test]
        fn markdown_chunking_is_stable(content in "[a-z# \n]{0,300}") {
            let first = chunker().chunk_markdown(&doc("p.md"), &content);
            let second = chunker().chunk_markdown(&doc("p.md"), &content);
            proptest::prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn unicode_content_chunks_on_character_boundaries() {
        let config = ChunkerConfig {
            generic_chunk_size: 4,
            generic_overlap_ratio: 0.0,
        };
        let content = "héllö wörld";
        let chunks = SemanticChunker::new(config).chunk_generic(&doc("t"), content);
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, content);
    }
}
