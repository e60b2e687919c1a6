// Copyright 2025 Cowboy AI, LLC.

//! Chunks - the embedding unit of a document
//!
//! A document is covered by an ordered sequence of chunks. Only Generic
//! chunks may overlap, and only by the chunker's configured window.

use crate::hashing::content_hash;
use crate::identifiers::{ChunkId, DocumentId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of a chunk, determined by the chunking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkKind {
    /// Section of a markdown document, bounded by headings
    MarkdownSection,
    /// Top-level code unit (function or class)
    CodeUnit,
    /// Fixed-size slice of unstructured content
    Generic,
}

/// Where a chunk sits inside its document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "boundary", rename_all = "snake_case")]
pub enum ChunkBoundary {
    /// Heading path from the document root to this section
    HeadingPath {
        /// Headings from outermost to innermost
        path: Vec<String>,
    },
    /// Qualified name of the owning function or class
    QualifiedName {
        /// Dotted qualified name
        name: String,
    },
    /// Byte range in the original document
    ByteRange {
        /// Inclusive start offset
        start: usize,
        /// Exclusive end offset
        end: usize,
    },
}

/// An ordered slice of a document used as the embedding unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Chunk {
    /// Stable chunk identifier
    pub chunk_id: ChunkId,
    /// Owning document
    pub document_id: DocumentId,
    /// Position within the document's chunk sequence
    pub ordinal: usize,
    /// Chunk content
    pub content: String,
    /// Hash of the normalized content
    pub content_hash: String,
    /// Embedding vector, absent until the engine fills it
    pub embedding: Option<Vec<f32>>,
    /// Chunk kind
    pub kind: ChunkKind,
    /// Boundary within the document
    pub boundary: ChunkBoundary,
}

impl Chunk {
    /// Build a chunk, deriving its hash and id from the content
    pub fn new(
        document_id: DocumentId,
        ordinal: usize,
        content: impl Into<String>,
        kind: ChunkKind,
        boundary: ChunkBoundary,
    ) -> Self {
        let content = content.into();
        let content_hash = content_hash(&content);
        let chunk_id = ChunkId::derive(&document_id, ordinal, &content_hash);
        Self {
            chunk_id,
            document_id,
            ordinal,
            content,
            content_hash,
            embedding: None,
            kind,
            boundary,
        }
    }

    /// Attach an embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Content length in characters
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    /// Whether the chunk carries no content
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
