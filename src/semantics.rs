// Copyright 2025 Cowboy AI, LLC.

//! Semantic analysis of ingested content
//!
//! The analyzer is a Compute node: deterministic term statistics, no
//! model calls. Concepts come from term frequency, themes from heading
//! structure, domains from path and vocabulary hints. A missing
//! analysis is distinct from an analysis with empty lists; the
//! orchestrator only attaches an analysis when it actually ran.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cosine similarity between two vectors
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// A label with an attached confidence in [0,1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoredLabel {
    /// The label text
    pub label: String,
    /// Confidence in [0,1]
    pub confidence: f32,
}

impl ScoredLabel {
    /// Create a scored label, clamping the confidence
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Semantic analysis of a chunk or document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SemanticAnalysis {
    /// Extracted concepts
    pub concepts: Vec<ScoredLabel>,
    /// Detected themes
    pub themes: Vec<ScoredLabel>,
    /// Detected domains
    pub domains: Vec<ScoredLabel>,
    /// Detected recurring patterns
    pub patterns: Vec<ScoredLabel>,
    /// Ratio of meaningful to total terms, in [0,1]
    pub semantic_density: f32,
    /// Concentration of the concept distribution, in [0,1]
    pub conceptual_coherence: f32,
    /// Agreement between themes across sections, in [0,1]
    pub thematic_consistency: f32,
}

impl SemanticAnalysis {
    /// An analysis that ran but found nothing
    pub fn empty() -> Self {
        Self {
            concepts: Vec::new(),
            themes: Vec::new(),
            domains: Vec::new(),
            patterns: Vec::new(),
            semantic_density: 0.0,
            conceptual_coherence: 0.0,
            thematic_consistency: 0.0,
        }
    }
}

/// Configuration for the semantic analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticAnalyzerConfig {
    /// Maximum number of concepts to emit
    pub max_concepts: usize,
    /// Maximum number of themes to emit
    pub max_themes: usize,
    /// Minimum occurrences for a term to become a concept
    pub min_term_count: usize,
}

impl Default for SemanticAnalyzerConfig {
    fn default() -> Self {
        Self {
            max_concepts: 10,
            max_themes: 5,
            min_term_count: 2,
        }
    }
}

/// Deterministic semantic analyzer (Compute)
#[derive(Debug, Clone, Default)]
pub struct SemanticAnalyzer {
    config: SemanticAnalyzerConfig,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "s", "such", "t", "that",
    "the", "their", "then", "there", "these", "they", "this", "to", "was", "we", "were", "will",
    "with", "you", "your",
];

/// Domain vocabularies consulted when classifying content
const DOMAIN_HINTS: &[(&str, &[&str])] = &[
    ("api", &["endpoint", "request", "response", "http", "route", "handler"]),
    ("data", &["schema", "table", "query", "index", "record", "store"]),
    ("infra", &["deploy", "container", "cluster", "pipeline", "config"]),
    ("testing", &["test", "assert", "mock", "fixture", "coverage"]),
    ("docs", &["guide", "overview", "tutorial", "reference", "readme"]),
];

impl SemanticAnalyzer {
    /// Create an analyzer with the given configuration
    pub fn new(config: SemanticAnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze content, using the source path as a domain hint
    pub fn analyze(&self, content: &str, source_path: &str) -> SemanticAnalysis {
        let tokens = tokenize(content);
        if tokens.is_empty() {
            return SemanticAnalysis::empty();
        }

        let total = tokens.len();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let max_count = counts.values().copied().max().unwrap_or(1);

        // Concepts: frequent terms, count-descending then lexicographic.
        let mut ranked: Vec<(&str, usize)> = counts
            .iter()
            .filter(|(_, c)| **c >= self.config.min_term_count)
            .map(|(t, c)| (*t, *c))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let concepts: Vec<ScoredLabel> = ranked
            .iter()
            .take(self.config.max_concepts)
            .map(|(t, c)| ScoredLabel::new(*t, *c as f32 / max_count as f32))
            .collect();

        // Themes: heading lines, in document order.
        let themes = heading_themes(content, self.config.max_themes);

        // Domains: vocabulary overlap plus path hints.
        let domains = classify_domains(&counts, source_path);

        // Patterns: repeated heading prefixes (e.g. "Example:" sections).
        let patterns = repeated_prefixes(content);

        let unique = counts.len();
        let semantic_density = (unique as f32 / total as f32).clamp(0.0, 1.0);
        let conceptual_coherence = if concepts.is_empty() {
            0.0
        } else {
            let mass: f32 = concepts.iter().map(|c| c.confidence).sum();
            (mass / concepts.len() as f32).clamp(0.0, 1.0)
        };
        let thematic_consistency = theme_consistency(&themes);

        SemanticAnalysis {
            concepts,
            themes,
            domains,
            patterns,
            semantic_density,
            conceptual_coherence,
            thematic_consistency,
        }
    }
}

/// Lowercased, stop-word-filtered word tokens
pub fn tokenize(content: &str) -> Vec<String> {
    content
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

fn heading_themes(content: &str, max: usize) -> Vec<ScoredLabel> {
    let mut themes = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let depth = trimmed.chars().take_while(|c| *c == '#').count();
            let title = trimmed.trim_start_matches('#').trim();
            if !title.is_empty() {
                themes.push(ScoredLabel::new(title, 1.0 / depth as f32));
            }
        }
        if themes.len() >= max {
            break;
        }
    }
    themes
}

fn classify_domains(counts: &BTreeMap<&str, usize>, source_path: &str) -> Vec<ScoredLabel> {
    let path = source_path.to_lowercase();
    let mut domains = Vec::new();
    for (domain, vocabulary) in DOMAIN_HINTS {
        let hits = vocabulary
            .iter()
            .filter(|word| counts.contains_key(*word))
            .count();
        let path_hit = path.contains(domain);
        if hits > 0 || path_hit {
            let score = hits as f32 / vocabulary.len() as f32 + if path_hit { 0.5 } else { 0.0 };
            domains.push(ScoredLabel::new(*domain, score));
        }
    }
    domains.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.label.cmp(&b.label))
    });
    domains
}

fn repeated_prefixes(content: &str) -> Vec<ScoredLabel> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim_start().trim_start_matches('#').trim_start();
        if let Some((prefix, _)) = trimmed.split_once(':') {
            let prefix = prefix.trim().to_lowercase();
            if !prefix.is_empty() && prefix.len() <= 24 && prefix.chars().all(|c| c.is_alphanumeric() || c == ' ') {
                *counts.entry(prefix).or_insert(0) += 1;
            }
        }
    }
    let max = counts.values().copied().max().unwrap_or(1);
    counts
        .into_iter()
        .filter(|(_, c)| *c >= 2)
        .map(|(p, c)| ScoredLabel::new(p, c as f32 / max as f32))
        .collect()
}

fn theme_consistency(themes: &[ScoredLabel]) -> f32 {
    if themes.len() < 2 {
        return if themes.is_empty() { 0.0 } else { 1.0 };
    }
    let sets: Vec<Vec<String>> = themes.iter().map(|t| tokenize(&t.label)).collect();
    let mut pairs = 0u32;
    let mut overlapping = 0u32;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            pairs += 1;
            if sets[i].iter().any(|t| sets[j].contains(t)) {
                overlapping += 1;
            }
        }
    }
    if pairs == 0 {
        0.0
    } else {
        overlapping as f32 / pairs as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cosine_similarity_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn analysis_is_deterministic() {
        let analyzer = SemanticAnalyzer::default();
        let content = "# Search API\nThe search endpoint accepts a query request. \
                       The query request returns a response. Search is ranked.";
        let a = analyzer.analyze(content, "docs/api.md");
        let b = analyzer.analyze(content, "docs/api.md");
        assert_eq!(a, b);
    }

    #[test]
    fn concepts_come_from_repeated_terms() {
        let analyzer = SemanticAnalyzer::default();
        let analysis = analyzer.analyze(
            "query query query search search response",
            "notes.txt",
        );
        assert_eq!(analysis.concepts[0].label, "query");
        assert_eq!(analysis.concepts[0].confidence, 1.0);
        assert!(analysis.concepts.iter().any(|c| c.label == "search"));
    }

    #[test]
    fn empty_content_yields_empty_analysis() {
        let analyzer = SemanticAnalyzer::default();
        let analysis = analyzer.analyze("", "a.txt");
        assert_eq!(analysis, SemanticAnalysis::empty());
    }

    #[test]
    fn metrics_are_bounded() {
        let analyzer = SemanticAnalyzer::default();
        let analysis = analyzer.analyze(
            "# Setup\ninstall the cluster config\n# Setup again\ndeploy the cluster config deploy",
            "infra/deploy.md",
        );
        for metric in [
            analysis.semantic_density,
            analysis.conceptual_coherence,
            analysis.thematic_consistency,
        ] {
            assert!((0.0..=1.0).contains(&metric));
        }
        for label in analysis
            .concepts
            .iter()
            .chain(&analysis.themes)
            .chain(&analysis.domains)
            .chain(&analysis.patterns)
        {
            assert!((0.0..=1.0).contains(&label.confidence));
        }
    }

    #[test]
    fn domains_use_path_hints() {
        let analyzer = SemanticAnalyzer::default();
        let analysis = analyzer.analyze("plain words here words", "docs/guide.md");
        assert!(analysis.domains.iter().any(|d| d.label == "docs"));
    }

    #[test]
    fn themes_follow_heading_depth() {
        let analyzer = SemanticAnalyzer::default();
        let analysis = analyzer.analyze("# Top\n## Nested\nbody", "a.md");
        assert_eq!(analysis.themes[0].label, "Top");
        assert_eq!(analysis.themes[0].confidence, 1.0);
        assert_eq!(analysis.themes[1].label, "Nested");
        assert_eq!(analysis.themes[1].confidence, 0.5);
    }
}
