// Copyright 2025 Cowboy AI, LLC.

//! # CIM Intelligence
//!
//! Intelligence pipeline kernel for the Composable Information Machine.
//!
//! This crate is the node graph behind ingestion, analysis, and search:
//! - **Node runtime**: typed contracts, dispatch by operation name,
//!   timeout and retry enforcement
//! - **Ingestion**: chunking, incremental embedding, entity extraction,
//!   quality scoring, ordered writes with compensation
//! - **Pattern learning**: success-gated extraction from execution
//!   traces, hybrid match scoring, replay planning
//! - **Stores**: graph, vector, and relational Effects with reference
//!   in-memory implementations and optional wire bindings
//! - **Events**: envelopes, idempotent consumption, dead-letter
//!   routing, circuit breaking over a Kafka-shaped bus
//!
//! ## Design Principles
//!
//! 1. **Side-effect discipline**: Compute nodes are pure and never
//!    suspend; only Effects touch stores or the bus
//! 2. **Determinism**: identical input produces identical chunks,
//!    embeddings, extractions, and rankings
//! 3. **Idempotency**: merges by stable ids everywhere; consumers
//!    dedupe by `event_id` before side effects
//! 4. **Explicit wiring**: every node receives its dependencies at
//!    construction; there is no process-global state

#![warn(missing_docs)]

mod chunk;
mod chunker;
mod contract;
mod entity;
mod errors;
mod hashing;
mod ingestion;
mod metadata;
mod quality;
mod relationship;
mod runtime;
mod search;
mod semantics;
mod trace;

pub mod config;
pub mod embedding;
pub mod events;
pub mod extract;
pub mod identifiers;
pub mod patterns;
pub mod stores;

// Re-export core types
pub use chunk::{Chunk, ChunkBoundary, ChunkKind};
pub use chunker::{is_code_language, ChunkerConfig, SemanticChunker};
pub use config::{EmbeddingConfig, IntelligenceConfig, RetentionConfig};
pub use contract::{
    DependencyDescriptor, DependencyKind, NodeContract, NodeKind, OperationSpec, RetryPolicy,
};
pub use entity::{Entity, EntityKind, PropertyValue};
pub use errors::{ErrorReport, NodeError, NodeResult};
pub use hashing::{content_hash, hash_bytes, signature_hash};
pub use identifiers::{
    CausationId, ChunkId, CorrelationId, DocumentId, EntityKey, EventId, PatternId, TraceId,
};
pub use ingestion::{
    CompletionSink, ContentResolver, ContentStrategy, FileEntry, FileReport, FileSource,
    FileStatus, IngestOperation, IngestionConfig, IngestionLimits, IngestionOrchestrator,
    IngestionRequest, ObjectStorageConfig, ProjectReport, PublishingSink, FILE_COMPLETED_EVENT,
    PROCESSING_COMPLETED_EVENT, PROCESSING_FAILED_EVENT,
};
pub use metadata::{
    Classification, IntelligenceMetadata, IntelligenceRequest, MetadataStamper,
    PatternIntelligence, PatternMatchSummary, DEFAULT_MIN_CONFIDENCE,
};
pub use quality::{
    trust_score, ComplianceCheck, Maturity, MaturityBands, QualityInput, QualityReport,
    QualityScorer,
};
pub use relationship::{Relationship, RelationshipKind};
pub use runtime::{Node, NodeRuntime};
pub use search::{
    fuse, HybridSearchOrchestrator, SearchConfig, SearchHit, SearchMode, SearchSource,
    SearchWeights,
};
pub use semantics::{
    cosine_similarity, ScoredLabel, SemanticAnalysis, SemanticAnalyzer, SemanticAnalyzerConfig,
};
pub use trace::{EndpointCall, ExecutionTrace, HookExecution, TraceStatus};
