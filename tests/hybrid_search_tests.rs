// Copyright 2025 Cowboy AI, LLC.

//! Hybrid search over populated in-memory stores

use chrono::Utc;
use cim_intelligence::embedding::{DeterministicEmbedder, EmbeddingCache, EmbeddingProvider};
use cim_intelligence::patterns::{ExecutionPath, Pattern};
use cim_intelligence::stores::{
    CollectionSpec, GraphStore, InMemoryGraphStore, InMemoryPatternStore, InMemoryVectorStore,
    PatternStore, VectorPayload, VectorStore,
};
use cim_intelligence::{
    ChunkId, ChunkKind, DocumentId, Entity, EntityKind, HybridSearchOrchestrator, PatternId,
    SearchConfig, SearchMode, SearchSource, TraceId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const DIMENSION: usize = 64;

async fn populated_orchestrator() -> HybridSearchOrchestrator {
    let vector = Arc::new(InMemoryVectorStore::new());
    let graph = Arc::new(InMemoryGraphStore::new());
    let patterns = Arc::new(InMemoryPatternStore::new());
    let provider = Arc::new(DeterministicEmbedder::new(DIMENSION));

    vector
        .ensure_collection(CollectionSpec {
            name: "chunks".into(),
            dimension: DIMENSION,
        })
        .await
        .unwrap();

    // Vector side: two chunks, one about search ranking, one unrelated.
    for (id, text) in [
        ("doc#0", "search ranking and score fusion"),
        ("doc#1", "kafka partition rebalancing"),
    ] {
        let embedding = provider.embed(text).await.unwrap();
        vector
            .upsert(
                "chunks",
                embedding,
                VectorPayload {
                    chunk_id: ChunkId::from_string(id),
                    document_id: DocumentId::derive("demo", "guide.md"),
                    ordinal: 0,
                    content_hash: cim_intelligence::content_hash(text),
                    kind: ChunkKind::MarkdownSection,
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .unwrap();
    }

    // Graph side: an entity named like the query subject.
    graph
        .create_entity(Entity::new(
            EntityKind::Function,
            "src/search.py",
            "search.ranking",
            Utc::now(),
        ))
        .await
        .unwrap();
    graph
        .create_entity(Entity::new(
            EntityKind::Function,
            "src/bus.py",
            "bus.rebalance",
            Utc::now(),
        ))
        .await
        .unwrap();

    // Relational side: one learned pattern about ranking.
    patterns
        .insert_pattern(Pattern {
            pattern_id: PatternId::new(),
            source_trace_id: TraceId::new(),
            prompt_text: "improve search ranking fusion".into(),
            prompt_embedding: provider
                .embed("improve search ranking fusion")
                .await
                .unwrap(),
            intent: "refactor".into(),
            keywords: ["search", "ranking", "fusion"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            execution_path: ExecutionPath {
                agent: "code-agent".into(),
                hook_types: vec![],
                endpoint_paths: vec![],
            },
            performance_profile: None,
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            initial_score: 0.9,
            active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    HybridSearchOrchestrator::new(
        vector,
        graph,
        patterns,
        provider,
        Arc::new(EmbeddingCache::new(64)),
        SearchConfig::default(),
    )
}

#[tokio::test]
async fn hybrid_search_fuses_all_three_modes() {
    let orchestrator = populated_orchestrator().await;
    let hits = orchestrator
        .search("search ranking fusion", SearchMode::Hybrid)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    let sources: Vec<SearchSource> = hits.iter().map(|h| h.best_source).collect();
    assert!(sources.contains(&SearchSource::Semantic));
    assert!(sources.contains(&SearchSource::Structural));
    assert!(sources.contains(&SearchSource::Relational));

    // The on-topic chunk outranks the unrelated one.
    let on_topic = hits.iter().position(|h| h.id == "doc#0");
    let off_topic = hits.iter().position(|h| h.id == "doc#1");
    match (on_topic, off_topic) {
        (Some(a), Some(b)) => assert!(a < b),
        (Some(_), None) => {}
        other => panic!("unexpected ranking {other:?}"),
    }
}

#[tokio::test]
async fn single_mode_searches_stay_in_their_lane() {
    let orchestrator = populated_orchestrator().await;

    let semantic = orchestrator
        .search("search ranking fusion", SearchMode::Semantic)
        .await
        .unwrap();
    assert!(semantic
        .iter()
        .all(|h| h.best_source == SearchSource::Semantic));

    let structural = orchestrator
        .search("ranking", SearchMode::Structural)
        .await
        .unwrap();
    assert!(structural
        .iter()
        .all(|h| h.best_source == SearchSource::Structural));
    assert!(structural.iter().any(|h| h.label == "ranking"));

    let relational = orchestrator
        .search("search ranking", SearchMode::Relational)
        .await
        .unwrap();
    assert!(relational
        .iter()
        .all(|h| h.best_source == SearchSource::Relational));
}

#[tokio::test]
async fn search_rankings_are_stable() {
    let orchestrator = populated_orchestrator().await;
    let first = orchestrator
        .search("search ranking fusion", SearchMode::Hybrid)
        .await
        .unwrap();
    let second = orchestrator
        .search("search ranking fusion", SearchMode::Hybrid)
        .await
        .unwrap();

    let ids_first: Vec<&str> = first.iter().map(|h| h.id.as_str()).collect();
    let ids_second: Vec<&str> = second.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids_first, ids_second);
    for (a, b) in first.iter().zip(&second) {
        assert!((a.fused_score - b.fused_score).abs() < 1e-6);
    }
}
