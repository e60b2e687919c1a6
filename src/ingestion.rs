// Copyright 2025 Cowboy AI, LLC.

//! Ingestion orchestrator
//!
//! Drives the per-document pipeline: resolve content, chunk, embed
//! incrementally, extract entities, score quality, then write in order
//! (graph entities before relationships, vector upserts after graph,
//! completion event last). Files fan out under a bounded concurrency
//! cap; per-file failures emit `processing.failed` and leave stores in
//! a state where re-ingestion of the same file converges on the
//! intended final state.

use crate::chunk::Chunk;
use crate::chunker::{is_code_language, SemanticChunker};
use crate::contract::{DependencyKind, NodeContract, NodeKind, OperationSpec};
use crate::embedding::incremental::IncrementalEmbeddingEngine;
use crate::entity::EntityKind;
use crate::errors::{ErrorReport, NodeError, NodeResult};
use crate::extract::{ExtractionInput, ExtractorRegistry};
use crate::hashing::hash_bytes;
use crate::identifiers::{CorrelationId, DocumentId};
use crate::quality::{QualityInput, QualityReport, QualityScorer};
use crate::runtime::Node;
use crate::semantics::{SemanticAnalysis, SemanticAnalyzer};
use crate::stores::graph::{GraphBatch, GraphStore};
use crate::stores::vector::CollectionRouter;
use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// How a file's content reaches the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentStrategy {
    /// Content travels inside the event
    Inline,
    /// Content is fetched from object storage by URL
    ObjectStorage,
    /// Content is fetched from a git repository
    GitReference,
}

/// Object-storage coordinates for a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectStorageConfig {
    /// Storage provider name
    pub provider: String,
    /// Bucket holding the content
    pub bucket: String,
}

/// Per-file content source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FileSource {
    /// UTF-8 or base64 content inside the event
    Inline {
        /// The content itself
        content: String,
        /// Encoding of `content`: `utf-8` or `base64`
        content_encoding: String,
    },
    /// Retrievable URL with an expiry
    ObjectStorage {
        /// Pre-signed or public URL
        content_url: String,
        /// URL flavor, e.g. `presigned`
        content_url_type: String,
        /// When the URL stops working
        content_url_expires_at: DateTime<Utc>,
    },
    /// Resolved through the batch's git url and ref
    GitReference,
}

/// One file in an ingestion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileEntry {
    /// Path relative to the project root
    pub relative_path: String,
    /// Declared language
    pub language: String,
    /// Size in bytes
    pub size_bytes: usize,
    /// Checksum as `<algo>:<hex>`
    pub checksum: String,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
    /// Per-file strategy override
    pub content_strategy: Option<ContentStrategy>,
    /// Where the content comes from
    #[serde(flatten)]
    pub source: FileSource,
}

impl FileEntry {
    /// Build an inline UTF-8 entry with a computed checksum
    pub fn inline(
        relative_path: impl Into<String>,
        language: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            relative_path: relative_path.into(),
            language: language.into(),
            size_bytes: content.len(),
            checksum: hash_bytes(content.as_bytes()),
            last_modified: Utc::now(),
            content_strategy: None,
            source: FileSource::Inline {
                content,
                content_encoding: "utf-8".into(),
            },
        }
    }

    /// The strategy in force for this file
    pub fn strategy(&self, request_default: ContentStrategy) -> ContentStrategy {
        self.content_strategy.unwrap_or(request_default)
    }
}

/// Ingestion request, schema v2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IngestionRequest {
    /// Project name
    pub project_name: String,
    /// Project path on the producing host, when known
    pub project_path: Option<String>,
    /// Default content strategy; mandatory at schema v2
    pub content_strategy: ContentStrategy,
    /// Repository URL for git-referenced content
    pub git_url: Option<String>,
    /// Git ref for git-referenced content
    pub git_ref: Option<String>,
    /// Object-storage coordinates for the batch
    pub object_storage_config: Option<ObjectStorageConfig>,
    /// Files to ingest
    pub files: Vec<FileEntry>,
    /// Re-embed even when content hashes match
    #[serde(default)]
    pub force_reindex: bool,
}

impl IngestionRequest {
    /// Validate the size and strategy contracts
    pub fn validate(&self, limits: &IngestionLimits) -> NodeResult<()> {
        let mut inline_total = 0usize;
        for file in &self.files {
            let strategy = file.strategy(self.content_strategy);
            match (&file.source, strategy) {
                (FileSource::Inline { content, .. }, ContentStrategy::Inline) => {
                    if content.len() > limits.inline_file_limit_bytes {
                        return Err(NodeError::InvalidInput(format!(
                            "inline file `{}` exceeds {} bytes; use object storage",
                            file.relative_path, limits.inline_file_limit_bytes
                        )));
                    }
                    inline_total += content.len();
                }
                (FileSource::Inline { .. }, _) => {
                    return Err(NodeError::InvalidInput(format!(
                        "file `{}` carries inline content but declares another strategy",
                        file.relative_path
                    )));
                }
                (FileSource::GitReference, ContentStrategy::GitReference) => {
                    if self.git_url.is_none() || self.git_ref.is_none() {
                        return Err(NodeError::InvalidInput(
                            "git-referenced files require git_url and git_ref".into(),
                        ));
                    }
                }
                _ => {}
            }
            if !file.checksum.contains(':') {
                return Err(NodeError::InvalidInput(format!(
                    "checksum of `{}` is not `<algo>:<hex>`",
                    file.relative_path
                )));
            }
        }
        if inline_total > limits.inline_batch_limit_bytes {
            return Err(NodeError::InvalidInput(format!(
                "batch inline content exceeds {} bytes",
                limits.inline_batch_limit_bytes
            )));
        }
        Ok(())
    }
}

/// Size contracts enforced before publishing or processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionLimits {
    /// Per-file inline ceiling
    pub inline_file_limit_bytes: usize,
    /// Per-batch inline ceiling
    pub inline_batch_limit_bytes: usize,
}

impl Default for IngestionLimits {
    fn default() -> Self {
        Self {
            inline_file_limit_bytes: 100 * 1024,
            inline_batch_limit_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Concurrent per-file workflows
    pub max_concurrency: usize,
    /// Size contracts
    pub limits: IngestionLimits,
    /// Collection routing
    pub router: CollectionRouter,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            limits: IngestionLimits::default(),
            router: CollectionRouter::default(),
        }
    }
}

/// Resolves file content for non-inline strategies
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Fetch the content of one file
    async fn resolve(&self, request: &IngestionRequest, file: &FileEntry) -> NodeResult<String>;
}

/// Events emitted by the orchestrator
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// A file finished all its writes
    async fn file_completed(
        &self,
        correlation_id: CorrelationId,
        report: &FileReport,
    ) -> NodeResult<()>;

    /// A file failed; carries the original correlation
    async fn file_failed(
        &self,
        correlation_id: CorrelationId,
        report: &ErrorReport,
    ) -> NodeResult<()>;

    /// Every per-file workflow of the request finished
    async fn project_completed(
        &self,
        correlation_id: CorrelationId,
        report: &ProjectReport,
    ) -> NodeResult<()>;
}

/// Event type published when a file finishes all writes
pub const FILE_COMPLETED_EVENT: &str = "intelligence.file.completed";
/// Event type published when a file fails
pub const PROCESSING_FAILED_EVENT: &str = "intelligence.processing.failed";
/// Event type published when a whole request finishes
pub const PROCESSING_COMPLETED_EVENT: &str = "intelligence.processing.completed";

/// Completion sink that publishes through the event publisher
pub struct PublishingSink {
    publisher: Arc<crate::events::publisher::EventPublisher>,
}

impl PublishingSink {
    /// Wrap a publisher
    pub fn new(publisher: Arc<crate::events::publisher::EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl CompletionSink for PublishingSink {
    async fn file_completed(
        &self,
        correlation_id: CorrelationId,
        report: &FileReport,
    ) -> NodeResult<()> {
        self.publisher
            .publish(
                FILE_COMPLETED_EVENT,
                1,
                correlation_id,
                serde_json::to_value(report)?,
            )
            .await?;
        Ok(())
    }

    async fn file_failed(
        &self,
        correlation_id: CorrelationId,
        report: &ErrorReport,
    ) -> NodeResult<()> {
        self.publisher
            .publish(
                PROCESSING_FAILED_EVENT,
                1,
                correlation_id,
                serde_json::to_value(report)?,
            )
            .await?;
        Ok(())
    }

    async fn project_completed(
        &self,
        correlation_id: CorrelationId,
        report: &ProjectReport,
    ) -> NodeResult<()> {
        self.publisher
            .publish(
                PROCESSING_COMPLETED_EVENT,
                1,
                correlation_id,
                serde_json::to_value(report)?,
            )
            .await?;
        Ok(())
    }
}

/// Outcome of one file's workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Fully processed and written
    Ingested,
    /// Hash matched the last ingestion; metadata refreshed only
    Unchanged,
    /// Failed; a `processing.failed` event was emitted
    Failed,
}

/// Per-file ingestion report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileReport {
    /// File path
    pub relative_path: String,
    /// Outcome
    pub status: FileStatus,
    /// Chunks in the current version
    pub chunks: usize,
    /// Chunks embedded through the provider
    pub embedded: usize,
    /// Chunks whose embeddings were reused
    pub reused: usize,
    /// Stale embeddings removed
    pub removed: usize,
    /// Entities written
    pub entities: usize,
    /// Relationships written
    pub relationships: usize,
    /// Quality report, for code files
    pub quality: Option<QualityReport>,
    /// Semantic analysis of the document
    pub semantics: Option<SemanticAnalysis>,
    /// Error report, when the file failed
    pub error: Option<ErrorReport>,
}

/// Whole-request ingestion report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectReport {
    /// Project name
    pub project_name: String,
    /// Per-file outcomes, in request order
    pub files: Vec<FileReport>,
}

impl ProjectReport {
    /// Count of files that did not fail
    pub fn succeeded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status != FileStatus::Failed)
            .count()
    }

    /// Count of failed files
    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }
}

/// Last known state of a document, for incremental re-embedding
#[derive(Debug, Clone)]
struct CatalogEntry {
    content_hash: String,
    chunks: Vec<Chunk>,
    last_modified: DateTime<Utc>,
}

/// The ingestion orchestrator
pub struct IngestionOrchestrator {
    contract: NodeContract,
    chunker: SemanticChunker,
    analyzer: SemanticAnalyzer,
    scorer: QualityScorer,
    extractors: ExtractorRegistry,
    engine: Arc<IncrementalEmbeddingEngine>,
    graph: Arc<dyn GraphStore>,
    sink: Arc<dyn CompletionSink>,
    object_storage: Option<Arc<dyn ContentResolver>>,
    git: Option<Arc<dyn ContentResolver>>,
    config: IngestionConfig,
    catalog: RwLock<HashMap<DocumentId, CatalogEntry>>,
    concurrency: Arc<Semaphore>,
}

impl IngestionOrchestrator {
    /// Wire the orchestrator to its collaborators
    pub fn new(
        engine: Arc<IncrementalEmbeddingEngine>,
        graph: Arc<dyn GraphStore>,
        sink: Arc<dyn CompletionSink>,
        config: IngestionConfig,
    ) -> Self {
        let contract = NodeContract::new("ingestion-orchestrator", NodeKind::Orchestrator, "2.0.0")
            .with_operation(
                OperationSpec::new::<IngestOperation, ProjectReport>("ingest")
                    .with_timeout_ms(300_000)
                    .with_idempotency_key("correlation_id"),
            )
            .with_dependency("graph", DependencyKind::GraphStore)
            .with_dependency("vector", DependencyKind::VectorStore)
            .with_dependency("bus", DependencyKind::Bus)
            .with_dependency("embeddings", DependencyKind::EmbeddingProvider);
        let concurrency = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            contract,
            chunker: SemanticChunker::default(),
            analyzer: SemanticAnalyzer::default(),
            scorer: QualityScorer::new(),
            extractors: ExtractorRegistry::with_builtins(),
            engine,
            graph,
            sink,
            object_storage: None,
            git: None,
            config,
            catalog: RwLock::new(HashMap::new()),
            concurrency,
        }
    }

    /// Attach an object-storage resolver
    pub fn with_object_storage(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.object_storage = Some(resolver);
        self
    }

    /// Attach a git resolver
    pub fn with_git(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.git = Some(resolver);
        self
    }

    /// Process an ingestion request end to end
    pub async fn ingest(
        &self,
        correlation_id: CorrelationId,
        request: &IngestionRequest,
    ) -> NodeResult<ProjectReport> {
        request.validate(&self.config.limits)?;
        info!(project = %request.project_name, files = request.files.len(), "ingestion started");

        let reports = join_all(
            request
                .files
                .iter()
                .map(|file| self.ingest_file(correlation_id, request, file)),
        )
        .await;

        let report = ProjectReport {
            project_name: request.project_name.clone(),
            files: reports,
        };

        // Project completion only after every per-file workflow finished.
        self.sink.project_completed(correlation_id, &report).await?;
        info!(
            project = %request.project_name,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// One file's workflow; failures are converted into a failed report
    /// plus a `processing.failed` event rather than aborting the batch
    async fn ingest_file(
        &self,
        correlation_id: CorrelationId,
        request: &IngestionRequest,
        file: &FileEntry,
    ) -> FileReport {
        let _permit = self.concurrency.acquire().await.ok();
        match self.process_file(correlation_id, request, file).await {
            Ok(report) => report,
            Err(error) => {
                warn!(path = %file.relative_path, error = %error, "file ingestion failed");
                let error_report = error.to_report(correlation_id);
                if let Err(publish_error) =
                    self.sink.file_failed(correlation_id, &error_report).await
                {
                    warn!(error = %publish_error, "failed to publish processing.failed");
                }
                FileReport {
                    relative_path: file.relative_path.clone(),
                    status: FileStatus::Failed,
                    chunks: 0,
                    embedded: 0,
                    reused: 0,
                    removed: 0,
                    entities: 0,
                    relationships: 0,
                    quality: None,
                    semantics: None,
                    error: Some(error_report),
                }
            }
        }
    }

    async fn process_file(
        &self,
        correlation_id: CorrelationId,
        request: &IngestionRequest,
        file: &FileEntry,
    ) -> NodeResult<FileReport> {
        let content = self.resolve_content(request, file).await?;
        let content_hash = hash_bytes(content.as_bytes());
        verify_checksum(&file.checksum, &content, &file.relative_path)?;

        let document_id = DocumentId::derive(&request.project_name, &file.relative_path);

        // Unchanged content skips the pipeline but refreshes metadata.
        let previous = {
            let catalog = self
                .catalog
                .read()
                .map_err(|_| NodeError::Internal("catalog lock poisoned".into()))?;
            catalog.get(&document_id).cloned()
        };
        if let Some(entry) = &previous {
            if entry.content_hash == content_hash && !request.force_reindex {
                self.refresh_metadata(&document_id, file)?;
                let report = FileReport {
                    relative_path: file.relative_path.clone(),
                    status: FileStatus::Unchanged,
                    chunks: entry.chunks.len(),
                    embedded: 0,
                    reused: entry.chunks.len(),
                    removed: 0,
                    entities: 0,
                    relationships: 0,
                    quality: None,
                    semantics: None,
                    error: None,
                };
                self.sink.file_completed(correlation_id, &report).await?;
                return Ok(report);
            }
        }

        // Compute phase: chunk, classify, embed, extract, analyze, score.
        let chunks = self
            .chunker
            .chunk(&document_id, &content, &file.language);
        let quality_scored = is_code_language(&file.language);
        let collection = self
            .config
            .router
            .route(EntityKind::File, quality_scored)
            .to_string();

        let previous_chunks = previous.as_ref().map(|e| e.chunks.as_slice()).unwrap_or(&[]);
        let plan = self
            .engine
            .prepare(&collection, previous_chunks, &chunks, None)
            .await?;

        let observed_at = Utc::now();
        let extraction = self.extractors.extract(&ExtractionInput {
            project: &request.project_name,
            relative_path: &file.relative_path,
            language: &file.language,
            content: &content,
            observed_at,
        })?;

        let semantics = Some(self.analyzer.analyze(&content, &file.relative_path));
        let quality = quality_scored.then(|| {
            self.scorer.score(&QualityInput {
                content: content.clone(),
                language: file.language.clone(),
                last_modified: Some(file.last_modified),
                reference_time: observed_at,
            })
        });

        // Write phase, in contract order: graph first (entities before
        // relationships, inside one transaction), then vector.
        let entities = extraction.entities.len();
        let relationships = extraction.relationships.len();
        self.graph
            .batch_upsert(GraphBatch {
                entities: extraction.entities,
                relationships: extraction.relationships,
            })
            .await?;
        self.engine.apply(&collection, &plan).await?;

        // Catalog update makes the next ingestion incremental.
        {
            let mut catalog = self
                .catalog
                .write()
                .map_err(|_| NodeError::Internal("catalog lock poisoned".into()))?;
            catalog.insert(
                document_id.clone(),
                CatalogEntry {
                    content_hash,
                    chunks: plan.chunks.clone(),
                    last_modified: file.last_modified,
                },
            );
        }

        let report = FileReport {
            relative_path: file.relative_path.clone(),
            status: FileStatus::Ingested,
            chunks: plan.chunks.len(),
            embedded: plan.report.embedded,
            reused: plan.report.reused,
            removed: plan.report.removed,
            entities,
            relationships,
            quality,
            semantics,
            error: None,
        };

        // Completion is emitted only after every write acknowledged.
        self.sink.file_completed(correlation_id, &report).await?;
        Ok(report)
    }

    async fn resolve_content(
        &self,
        request: &IngestionRequest,
        file: &FileEntry,
    ) -> NodeResult<String> {
        match &file.source {
            FileSource::Inline {
                content,
                content_encoding,
            } => match content_encoding.as_str() {
                "utf-8" | "utf8" => Ok(content.clone()),
                "base64" => {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(content)
                        .map_err(|e| NodeError::InvalidInput(format!("bad base64: {e}")))?;
                    String::from_utf8(bytes)
                        .map_err(|e| NodeError::InvalidInput(format!("bad utf-8: {e}")))
                }
                other => Err(NodeError::InvalidInput(format!(
                    "unsupported content encoding `{other}`"
                ))),
            },
            FileSource::ObjectStorage { .. } => match &self.object_storage {
                Some(resolver) => resolver.resolve(request, file).await,
                None => Err(NodeError::permanent(
                    "object-storage",
                    "no object-storage resolver configured",
                )),
            },
            FileSource::GitReference => match &self.git {
                Some(resolver) => resolver.resolve(request, file).await,
                None => Err(NodeError::permanent(
                    "git",
                    "no git resolver configured",
                )),
            },
        }
    }

    /// Last known `(content_hash, last_modified)` of a document
    pub fn document_state(&self, document_id: &DocumentId) -> Option<(String, DateTime<Utc>)> {
        self.catalog
            .read()
            .ok()?
            .get(document_id)
            .map(|e| (e.content_hash.clone(), e.last_modified))
    }

    fn refresh_metadata(&self, document_id: &DocumentId, file: &FileEntry) -> NodeResult<()> {
        let mut catalog = self
            .catalog
            .write()
            .map_err(|_| NodeError::Internal("catalog lock poisoned".into()))?;
        if let Some(entry) = catalog.get_mut(document_id) {
            entry.last_modified = file.last_modified;
        }
        Ok(())
    }
}

/// Typed input of the `ingest` operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IngestOperation {
    /// Correlation of the requesting workflow
    pub correlation_id: CorrelationId,
    /// The request
    pub request: IngestionRequest,
}

#[async_trait]
impl Node for IngestionOrchestrator {
    fn contract(&self) -> &NodeContract {
        &self.contract
    }

    async fn execute(
        &self,
        operation: &str,
        input: serde_json::Value,
    ) -> NodeResult<serde_json::Value> {
        match operation {
            "ingest" => {
                let input: IngestOperation = serde_json::from_value(input)?;
                let report = self.ingest(input.correlation_id, &input.request).await?;
                Ok(serde_json::to_value(report)?)
            }
            other => Err(NodeError::InvalidInput(format!(
                "unknown operation `{other}`"
            ))),
        }
    }
}

fn verify_checksum(checksum: &str, content: &str, path: &str) -> NodeResult<()> {
    if let Some(hex_digest) = checksum.strip_prefix("sha256:") {
        let computed = hash_bytes(content.as_bytes());
        if computed.strip_prefix("sha256:") != Some(hex_digest) {
            return Err(NodeError::PreconditionViolated(format!(
                "checksum mismatch for `{path}`"
            )));
        }
    }
    Ok(())
}
