// Copyright 2025 Cowboy AI, LLC.

//! Hybrid search orchestrator
//!
//! Runs semantic (vector), structural (graph), and relational (pattern)
//! sub-searches concurrently, normalizes per-mode scores, merges by
//! result identity, and ranks by the contract's weighted sum. Ties
//! break by mode priority (semantic over structural over relational),
//! then by lexicographic id, so rankings are deterministic.

use crate::embedding::cache::EmbeddingCache;
use crate::embedding::provider::EmbeddingProvider;
use crate::errors::NodeResult;
use crate::hashing::content_hash;
use crate::patterns::learning::extract_keywords;
use crate::semantics::tokenize;
use crate::stores::graph::{GraphQuery, GraphStore};
use crate::stores::relational::PatternStore;
use crate::stores::vector::VectorStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Search modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Vector similarity over chunk embeddings
    Semantic,
    /// Graph lookup over entities
    Structural,
    /// Pattern pool lookup
    Relational,
    /// All three, fused
    Hybrid,
}

/// One sub-search source, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// Vector similarity
    Semantic,
    /// Graph lookup
    Structural,
    /// Pattern pool
    Relational,
}

/// Fusion weights, declared by contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchWeights {
    /// Weight of the semantic mode
    pub semantic: f32,
    /// Weight of the structural mode
    pub structural: f32,
    /// Weight of the relational mode
    pub relational: f32,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            structural: 0.3,
            relational: 0.2,
        }
    }
}

impl SearchWeights {
    fn weight(&self, source: SearchSource) -> f32 {
        match source {
            SearchSource::Semantic => self.semantic,
            SearchSource::Structural => self.structural,
            SearchSource::Relational => self.relational,
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Fusion weights
    pub weights: SearchWeights,
    /// Vector collection searched by the semantic mode
    pub collection: String,
    /// Results per sub-search
    pub per_mode_limit: usize,
    /// Results returned after fusion
    pub limit: usize,
    /// Pattern retention floor consulted by the relational mode
    pub retention_floor: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            weights: SearchWeights::default(),
            collection: "chunks".into(),
            per_mode_limit: 20,
            limit: 10,
            retention_floor: 0.3,
        }
    }
}

/// One fused search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result identity (chunk id, entity id, or pattern id)
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Normalized score per contributing mode
    pub mode_scores: BTreeMap<SearchSource, f32>,
    /// Weighted fused score
    pub fused_score: f32,
    /// Highest-priority mode that contributed
    pub best_source: SearchSource,
}

/// Normalize a mode's scores to [0,1] by its maximum
fn normalize(results: &mut [(String, String, f32)]) {
    let max = results
        .iter()
        .map(|(_, _, s)| *s)
        .fold(0.0f32, f32::max);
    if max > 0.0 {
        for (_, _, score) in results.iter_mut() {
            *score /= max;
        }
    }
}

/// Fuse per-mode rankings into one deterministic ranking
///
/// Weights are redistributed proportionally over the enabled modes, so
/// disabling a mode is exactly that mode contributing zero with its
/// weight shared by the rest.
pub fn fuse(
    per_mode: &BTreeMap<SearchSource, Vec<(String, String, f32)>>,
    weights: &SearchWeights,
    enabled: &[SearchSource],
) -> Vec<SearchHit> {
    let total_weight: f32 = enabled.iter().map(|s| weights.weight(*s)).sum();
    if total_weight <= 0.0 {
        return Vec::new();
    }

    let mut merged: BTreeMap<String, SearchHit> = BTreeMap::new();
    for source in enabled {
        let Some(results) = per_mode.get(source) else {
            continue;
        };
        for (id, label, score) in results {
            let entry = merged.entry(id.clone()).or_insert_with(|| SearchHit {
                id: id.clone(),
                label: label.clone(),
                mode_scores: BTreeMap::new(),
                fused_score: 0.0,
                best_source: *source,
            });
            entry.mode_scores.insert(*source, *score);
            entry.best_source = entry.best_source.min(*source);
        }
    }

    let mut hits: Vec<SearchHit> = merged
        .into_values()
        .map(|mut hit| {
            hit.fused_score = enabled
                .iter()
                .map(|source| {
                    let normalized_weight = weights.weight(*source) / total_weight;
                    normalized_weight * hit.mode_scores.get(source).copied().unwrap_or(0.0)
                })
                .sum();
            hit
        })
        .collect();

    hits.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.best_source.cmp(&b.best_source))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits
}

/// The hybrid search orchestrator
pub struct HybridSearchOrchestrator {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    patterns: Arc<dyn PatternStore>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    config: SearchConfig,
}

impl HybridSearchOrchestrator {
    /// Wire the orchestrator to its stores
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        patterns: Arc<dyn PatternStore>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        config: SearchConfig,
    ) -> Self {
        Self {
            vector,
            graph,
            patterns,
            provider,
            cache,
            config,
        }
    }

    /// Run a search in the requested mode
    pub async fn search(&self, query: &str, mode: SearchMode) -> NodeResult<Vec<SearchHit>> {
        let enabled: Vec<SearchSource> = match mode {
            SearchMode::Semantic => vec![SearchSource::Semantic],
            SearchMode::Structural => vec![SearchSource::Structural],
            SearchMode::Relational => vec![SearchSource::Relational],
            SearchMode::Hybrid => vec![
                SearchSource::Semantic,
                SearchSource::Structural,
                SearchSource::Relational,
            ],
        };

        let mut per_mode: BTreeMap<SearchSource, Vec<(String, String, f32)>> = BTreeMap::new();
        let (semantic, structural, relational) = tokio::join!(
            self.semantic_results(query, enabled.contains(&SearchSource::Semantic)),
            self.structural_results(query, enabled.contains(&SearchSource::Structural)),
            self.relational_results(query, enabled.contains(&SearchSource::Relational)),
        );
        if let Some(mut results) = semantic? {
            normalize(&mut results);
            per_mode.insert(SearchSource::Semantic, results);
        }
        if let Some(mut results) = structural? {
            normalize(&mut results);
            per_mode.insert(SearchSource::Structural, results);
        }
        if let Some(mut results) = relational? {
            normalize(&mut results);
            per_mode.insert(SearchSource::Relational, results);
        }

        let mut hits = fuse(&per_mode, &self.config.weights, &enabled);
        hits.truncate(self.config.limit);
        debug!(query, ?mode, results = hits.len(), "search complete");
        Ok(hits)
    }

    async fn semantic_results(
        &self,
        query: &str,
        enabled: bool,
    ) -> NodeResult<Option<Vec<(String, String, f32)>>> {
        if !enabled {
            return Ok(None);
        }
        let embedding = self
            .cache
            .get_or_embed(self.provider.as_ref(), &content_hash(query), query)
            .await?;
        let hits = self
            .vector
            .search(
                &self.config.collection,
                &embedding,
                self.config.per_mode_limit,
                None,
                None,
            )
            .await?;
        Ok(Some(
            hits.into_iter()
                .map(|hit| {
                    let label = hit.payload.document_id.to_string();
                    (hit.chunk_id.as_str().to_string(), label, hit.score.max(0.0))
                })
                .collect(),
        ))
    }

    async fn structural_results(
        &self,
        query: &str,
        enabled: bool,
    ) -> NodeResult<Option<Vec<(String, String, f32)>>> {
        if !enabled {
            return Ok(None);
        }
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let mut results: BTreeMap<String, (String, f32)> = BTreeMap::new();
        for token in &tokens {
            let matches = self
                .graph
                .query(GraphQuery {
                    name_contains: Some(token.clone()),
                    limit: Some(self.config.per_mode_limit),
                    ..Default::default()
                })
                .await?;
            for matched in matches {
                let id = matched.entity.entity_id.as_str().to_string();
                let entry = results
                    .entry(id)
                    .or_insert_with(|| (matched.entity.name.clone(), 0.0));
                entry.1 += 1.0;
            }
        }

        let total = tokens.len() as f32;
        Ok(Some(
            results
                .into_iter()
                .map(|(id, (label, hits))| (id, label, hits / total))
                .collect(),
        ))
    }

    async fn relational_results(
        &self,
        query: &str,
        enabled: bool,
    ) -> NodeResult<Option<Vec<(String, String, f32)>>> {
        if !enabled {
            return Ok(None);
        }
        let query_keywords = extract_keywords(query);
        let patterns = self
            .patterns
            .active_patterns(self.config.retention_floor)
            .await?;

        Ok(Some(
            patterns
                .into_iter()
                .filter_map(|pattern| {
                    let union = query_keywords.union(&pattern.keywords).count();
                    if union == 0 {
                        return None;
                    }
                    let overlap =
                        query_keywords.intersection(&pattern.keywords).count() as f32
                            / union as f32;
                    if overlap == 0.0 {
                        return None;
                    }
                    Some((
                        pattern.pattern_id.to_string(),
                        pattern.prompt_text.clone(),
                        overlap * pattern.success_rate(),
                    ))
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ranked(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn fusion_is_the_documented_weighted_sum() {
        let mut per_mode = BTreeMap::new();
        per_mode.insert(
            SearchSource::Semantic,
            vec![("a".to_string(), "A".to_string(), 1.0)],
        );
        per_mode.insert(
            SearchSource::Structural,
            vec![("a".to_string(), "A".to_string(), 0.5)],
        );
        per_mode.insert(
            SearchSource::Relational,
            vec![("a".to_string(), "A".to_string(), 0.25)],
        );

        let hits = fuse(
            &per_mode,
            &SearchWeights::default(),
            &[
                SearchSource::Semantic,
                SearchSource::Structural,
                SearchSource::Relational,
            ],
        );
        let expected = 0.5 * 1.0 + 0.3 * 0.5 + 0.2 * 0.25;
        assert!((hits[0].fused_score - expected).abs() < 1e-6);
    }

    #[test]
    fn removing_a_mode_redistributes_its_weight() {
        let mut per_mode = BTreeMap::new();
        per_mode.insert(
            SearchSource::Semantic,
            vec![("a".to_string(), "A".to_string(), 0.8)],
        );
        per_mode.insert(
            SearchSource::Structural,
            vec![("a".to_string(), "A".to_string(), 0.4)],
        );

        let hits = fuse(
            &per_mode,
            &SearchWeights::default(),
            &[SearchSource::Semantic, SearchSource::Structural],
        );
        // Weights 0.5/0.3 renormalized over 0.8 total.
        let expected = (0.5 / 0.8) * 0.8 + (0.3 / 0.8) * 0.4;
        assert!((hits[0].fused_score - expected).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_mode_priority_then_id() {
        let mut per_mode = BTreeMap::new();
        per_mode.insert(
            SearchSource::Semantic,
            vec![("b".to_string(), "B".to_string(), 1.0)],
        );
        per_mode.insert(
            SearchSource::Structural,
            // Score chosen so both fused scores are equal.
            vec![("c".to_string(), "C".to_string(), 1.0)],
        );

        let weights = SearchWeights {
            semantic: 0.5,
            structural: 0.5,
            relational: 0.0,
        };
        let hits = fuse(
            &per_mode,
            &weights,
            &[SearchSource::Semantic, SearchSource::Structural],
        );
        // Equal fused scores: semantic-born `b` outranks structural `c`.
        assert_eq!(ranked(&hits), vec!["b", "c"]);

        // Same source and score: lexicographic id decides.
        let mut per_mode = BTreeMap::new();
        per_mode.insert(
            SearchSource::Semantic,
            vec![
                ("z".to_string(), "Z".to_string(), 1.0),
                ("a".to_string(), "A".to_string(), 1.0),
            ],
        );
        let hits = fuse(&per_mode, &weights, &[SearchSource::Semantic]);
        assert_eq!(ranked(&hits), vec!["a", "z"]);
    }

    #[test]
    fn results_in_multiple_modes_merge_into_one_hit() {
        let mut per_mode = BTreeMap::new();
        per_mode.insert(
            SearchSource::Semantic,
            vec![("a".to_string(), "A".to_string(), 0.9)],
        );
        per_mode.insert(
            SearchSource::Structural,
            vec![("a".to_string(), "A".to_string(), 0.7)],
        );

        let hits = fuse(
            &per_mode,
            &SearchWeights::default(),
            &[SearchSource::Semantic, SearchSource::Structural],
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].mode_scores.len(), 2);
        assert_eq!(hits[0].best_source, SearchSource::Semantic);
    }

    #[test]
    fn no_enabled_modes_yields_no_hits() {
        let per_mode = BTreeMap::new();
        let hits = fuse(&per_mode, &SearchWeights::default(), &[]);
        assert!(hits.is_empty());
    }
}
