// Copyright 2025 Cowboy AI, LLC.

//! Intelligence metadata stamping
//!
//! Builds the metadata record returned for an intelligence-generation
//! request: quality metrics, derived maturity and trust, semantic
//! analysis, and pattern intelligence, each section gated by the
//! request's include flags and confidence floor.

use crate::errors::NodeResult;
use crate::patterns::matcher::{MatchContext, PatternMatcher};
use crate::quality::{trust_score, Maturity, QualityInput, QualityReport, QualityScorer};
use crate::semantics::{ScoredLabel, SemanticAnalysis, SemanticAnalyzer};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default confidence floor applied when the request omits one
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.7;

/// An intelligence-generation request
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IntelligenceRequest {
    /// Path of the artifact to describe
    pub file_path: String,
    /// Content, when the caller already holds it
    pub content: Option<String>,
    /// Include pattern intelligence
    #[serde(default)]
    pub include_patterns: bool,
    /// Include the compliance checklist
    #[serde(default)]
    pub include_compliance: bool,
    /// Include semantic analysis
    #[serde(default)]
    pub include_semantic: bool,
    /// Confidence floor for surfaced labels and matches
    pub min_confidence: Option<f32>,
}

impl IntelligenceRequest {
    /// The effective confidence floor
    pub fn confidence_floor(&self) -> f32 {
        self.min_confidence
            .unwrap_or(DEFAULT_MIN_CONFIDENCE)
            .clamp(0.0, 1.0)
    }
}

/// Maturity and trust classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Classification {
    /// Derived maturity band
    pub maturity: Maturity,
    /// Quality score as an integer percentage
    pub trust_score: u32,
}

/// One surfaced pattern match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternMatchSummary {
    /// Pattern identifier
    pub pattern_id: String,
    /// Blended match score
    pub score: f32,
    /// Pattern intent
    pub intent: String,
    /// Current success rate
    pub success_rate: f32,
}

/// Pattern intelligence section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PatternIntelligence {
    /// Matches at or above the confidence floor
    pub matches: Vec<PatternMatchSummary>,
}

/// The stamped metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IntelligenceMetadata {
    /// Metadata schema version
    pub metadata_version: String,
    /// Artifact name
    pub name: String,
    /// Namespace the artifact belongs to
    pub namespace: String,
    /// Artifact version tag
    pub version: String,
    /// Entrypoint path
    pub entrypoint: String,
    /// Protocols the artifact speaks
    pub protocols_supported: Vec<String>,
    /// Maturity and trust
    pub classification: Classification,
    /// Quality metrics, always present
    pub quality_metrics: QualityReport,
    /// Semantic analysis, when requested
    pub semantic_intelligence: Option<SemanticAnalysis>,
    /// Pattern intelligence, when requested
    pub pattern_intelligence: Option<PatternIntelligence>,
    /// Free-text description
    pub description: String,
}

/// Builds metadata records from analysis results
pub struct MetadataStamper {
    scorer: QualityScorer,
    analyzer: SemanticAnalyzer,
    matcher: Option<Arc<PatternMatcher>>,
    namespace: String,
}

impl MetadataStamper {
    /// Create a stamper for a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            scorer: QualityScorer::new(),
            analyzer: SemanticAnalyzer::default(),
            matcher: None,
            namespace: namespace.into(),
        }
    }

    /// Attach a pattern matcher for pattern intelligence
    pub fn with_matcher(mut self, matcher: Arc<PatternMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Generate metadata for a request
    pub async fn generate(
        &self,
        request: &IntelligenceRequest,
        language: &str,
    ) -> NodeResult<IntelligenceMetadata> {
        let content = request.content.clone().unwrap_or_default();
        let floor = request.confidence_floor();

        let mut quality = self.scorer.score(&QualityInput {
            content: content.clone(),
            language: language.into(),
            last_modified: None,
            reference_time: Utc::now(),
        });
        if !request.include_compliance {
            quality.checks.clear();
        }

        let classification = Classification {
            maturity: Maturity::derive(quality.quality_score, quality.compliance_score),
            trust_score: trust_score(quality.quality_score),
        };

        let semantic_intelligence = request.include_semantic.then(|| {
            let mut analysis = self.analyzer.analyze(&content, &request.file_path);
            retain_confident(&mut analysis, floor);
            analysis
        });

        let pattern_intelligence = match (&self.matcher, request.include_patterns) {
            (Some(matcher), true) => {
                let matches = matcher
                    .match_request(&content, &MatchContext::default())
                    .await?;
                Some(PatternIntelligence {
                    matches: matches
                        .into_iter()
                        .filter(|m| m.score >= floor)
                        .map(|m| PatternMatchSummary {
                            pattern_id: m.pattern.pattern_id.to_string(),
                            score: m.score,
                            intent: m.pattern.intent.clone(),
                            success_rate: m.pattern.success_rate(),
                        })
                        .collect(),
                })
            }
            _ => None,
        };

        let name = request
            .file_path
            .rsplit('/')
            .next()
            .unwrap_or(&request.file_path)
            .to_string();

        Ok(IntelligenceMetadata {
            metadata_version: "1.0.0".into(),
            name: name.clone(),
            namespace: self.namespace.clone(),
            version: "0.1.0".into(),
            entrypoint: request.file_path.clone(),
            protocols_supported: vec!["event.v2".into()],
            classification,
            quality_metrics: quality,
            semantic_intelligence,
            pattern_intelligence,
            description: format!("Intelligence metadata for {name}"),
        })
    }
}

fn retain_confident(analysis: &mut SemanticAnalysis, floor: f32) {
    let keep = |labels: &mut Vec<ScoredLabel>| labels.retain(|l| l.confidence >= floor);
    keep(&mut analysis.concepts);
    keep(&mut analysis.themes);
    keep(&mut analysis.domains);
    keep(&mut analysis.patterns);
}
