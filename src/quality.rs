// Copyright 2025 Cowboy AI, LLC.

//! Quality scorer (Compute)
//!
//! Multi-factor scoring of source content. The aggregate score is a
//! fixed weighted average declared in the node contract; compliance is
//! a checklist where any critical violation forces non-compliance.
//! Maturity and trust derive from the scores and feed metadata
//! stamping.

use crate::contract::{NodeContract, NodeKind, OperationSpec, RetryPolicy};
use crate::errors::{NodeError, NodeResult};
use crate::runtime::Node;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Weight of the complexity sub-score
pub const COMPLEXITY_WEIGHT: f32 = 0.35;
/// Weight of the maintainability sub-score
pub const MAINTAINABILITY_WEIGHT: f32 = 0.30;
/// Weight of the documentation sub-score
pub const DOCUMENTATION_WEIGHT: f32 = 0.20;
/// Weight of the temporal-relevance sub-score
pub const TEMPORAL_WEIGHT: f32 = 0.15;

/// Input to the scorer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityInput {
    /// Source content
    pub content: String,
    /// Declared language
    pub language: String,
    /// Last modification time, when known
    pub last_modified: Option<DateTime<Utc>>,
    /// Reference time for temporal relevance
    pub reference_time: DateTime<Utc>,
}

/// One compliance checklist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ComplianceCheck {
    /// Check name
    pub name: String,
    /// Whether a failure forces non-compliance
    pub critical: bool,
    /// Whether the check passed
    pub passed: bool,
}

/// Scorer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityReport {
    /// Weighted aggregate score in [0,1]
    pub quality_score: f32,
    /// Whether every critical compliance check passed
    pub onex_compliant: bool,
    /// Fraction of compliance checks passed, in [0,1]
    pub compliance_score: f32,
    /// Complexity sub-score in [0,1]; higher is simpler
    pub complexity_score: f32,
    /// Maintainability sub-score in [0,1]
    pub maintainability_score: f32,
    /// Documentation sub-score in [0,1]
    pub documentation_score: f32,
    /// Temporal-relevance sub-score in [0,1]
    pub temporal_relevance: f32,
    /// Checklist results
    pub checks: Vec<ComplianceCheck>,
    /// Advisory recommendations
    pub recommendations: Vec<String>,
}

/// Derived maturity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    /// Early, unproven
    Alpha,
    /// Usable with caveats
    Beta,
    /// Reliable for general use
    Stable,
    /// Production grade
    Production,
}

/// Score floors for each maturity band; both quality and compliance
/// must clear a band's floor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MaturityBands {
    /// Floor for `production`
    pub production_floor: f32,
    /// Floor for `stable`
    pub stable_floor: f32,
    /// Floor for `beta`
    pub beta_floor: f32,
}

impl Default for MaturityBands {
    fn default() -> Self {
        Self {
            production_floor: 0.9,
            stable_floor: 0.75,
            beta_floor: 0.6,
        }
    }
}

impl Maturity {
    /// Derive maturity from quality and compliance scores using the
    /// default bands
    pub fn derive(quality_score: f32, compliance_score: f32) -> Self {
        Self::derive_with(quality_score, compliance_score, MaturityBands::default())
    }

    /// Derive maturity using explicit bands
    pub fn derive_with(quality_score: f32, compliance_score: f32, bands: MaturityBands) -> Self {
        let floor = quality_score.min(compliance_score);
        if floor >= bands.production_floor {
            Maturity::Production
        } else if floor >= bands.stable_floor {
            Maturity::Stable
        } else if floor >= bands.beta_floor {
            Maturity::Beta
        } else {
            Maturity::Alpha
        }
    }

    /// Stable lowercase tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Maturity::Alpha => "alpha",
            Maturity::Beta => "beta",
            Maturity::Stable => "stable",
            Maturity::Production => "production",
        }
    }
}

/// Trust score stamped on metadata: the quality score as an integer
/// percentage
pub fn trust_score(quality_score: f32) -> u32 {
    (quality_score.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Multi-factor quality scorer
#[derive(Debug, Clone)]
pub struct QualityScorer {
    contract: NodeContract,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityScorer {
    /// Create the scorer with its contract
    pub fn new() -> Self {
        let contract = NodeContract::new("quality-scorer", NodeKind::Compute, "1.0.0")
            .with_operation(
                OperationSpec::new::<QualityInput, QualityReport>("score")
                    .with_timeout_ms(5_000)
                    .with_retry(RetryPolicy::none()),
            );
        Self { contract }
    }

    /// Score one file
    pub fn score(&self, input: &QualityInput) -> QualityReport {
        let lines: Vec<&str> = input.content.lines().collect();
        let code_lines = lines.iter().filter(|l| !l.trim().is_empty()).count().max(1);

        let complexity_score = complexity(&lines);
        let maintainability_score = maintainability(&lines, code_lines);
        let documentation_score = documentation(&lines, code_lines);
        let temporal_relevance = temporal(input.last_modified, input.reference_time);

        let checks = compliance_checks(&input.content, &lines, documentation_score);
        let passed = checks.iter().filter(|c| c.passed).count();
        let compliance_score = passed as f32 / checks.len().max(1) as f32;
        let onex_compliant = checks.iter().all(|c| c.passed || !c.critical);

        let quality_score = COMPLEXITY_WEIGHT * complexity_score
            + MAINTAINABILITY_WEIGHT * maintainability_score
            + DOCUMENTATION_WEIGHT * documentation_score
            + TEMPORAL_WEIGHT * temporal_relevance;

        let recommendations = recommend(
            complexity_score,
            maintainability_score,
            documentation_score,
            &checks,
        );

        QualityReport {
            quality_score: quality_score.clamp(0.0, 1.0),
            onex_compliant,
            compliance_score,
            complexity_score,
            maintainability_score,
            documentation_score,
            temporal_relevance,
            checks,
            recommendations,
        }
    }
}

#[async_trait]
impl Node for QualityScorer {
    fn contract(&self) -> &NodeContract {
        &self.contract
    }

    async fn execute(&self, operation: &str, input: serde_json::Value) -> NodeResult<serde_json::Value> {
        match operation {
            "score" => {
                let input: QualityInput = serde_json::from_value(input)?;
                let report = self.score(&input);
                Ok(serde_json::to_value(report)?)
            }
            other => Err(NodeError::InvalidInput(format!(
                "unknown operation `{other}`"
            ))),
        }
    }
}

const BRANCH_KEYWORDS: &[&str] = &[
    "if ", "else", "for ", "while ", "match ", "switch", "case ", "elif ", "except", "catch",
];

fn complexity(lines: &[&str]) -> f32 {
    if lines.is_empty() {
        return 1.0;
    }
    let branches = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            BRANCH_KEYWORDS.iter().any(|k| t.starts_with(k))
        })
        .count();
    let max_indent = lines
        .iter()
        .map(|l| l.len() - l.trim_start().len())
        .max()
        .unwrap_or(0);

    let branch_density = branches as f32 / lines.len() as f32;
    let depth_penalty = (max_indent as f32 / 24.0).min(0.5);
    (1.0 - branch_density * 2.0 - depth_penalty).clamp(0.0, 1.0)
}

fn maintainability(lines: &[&str], code_lines: usize) -> f32 {
    let long_lines = lines.iter().filter(|l| l.len() > 120).count();
    let size_penalty = (code_lines as f32 / 1_000.0).min(0.4);
    let long_line_penalty = (long_lines as f32 / code_lines as f32).min(0.4);
    (1.0 - size_penalty - long_line_penalty).clamp(0.0, 1.0)
}

fn documentation(lines: &[&str], code_lines: usize) -> f32 {
    let doc_lines = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("///")
                || t.starts_with("//!")
                || t.starts_with('#') && !t.starts_with("#[")
                || t.starts_with("//")
                || t.starts_with("\"\"\"")
                || t.starts_with('*')
                || t.starts_with("/*")
        })
        .count();
    // Roughly one documentation line per five code lines earns full marks.
    ((doc_lines as f32 * 5.0) / code_lines as f32).clamp(0.0, 1.0)
}

fn temporal(last_modified: Option<DateTime<Utc>>, reference: DateTime<Utc>) -> f32 {
    match last_modified {
        None => 0.7,
        Some(at) => {
            let age_days = (reference - at).num_days().max(0) as f32;
            // Linear decay from 1.0 fresh to 0.3 at two years.
            (1.0 - (age_days / 730.0) * 0.7).clamp(0.3, 1.0)
        }
    }
}

fn compliance_checks(content: &str, lines: &[&str], documentation_score: f32) -> Vec<ComplianceCheck> {
    let has_conflict_markers = content.contains("<<<<<<<") || content.contains(">>>>>>>");
    let has_todo = lines
        .iter()
        .any(|l| l.contains("TODO") || l.contains("FIXME"));
    let longest_run = longest_blankless_run(lines);

    vec![
        ComplianceCheck {
            name: "no_merge_conflict_markers".into(),
            critical: true,
            passed: !has_conflict_markers,
        },
        ComplianceCheck {
            name: "non_empty_content".into(),
            critical: true,
            passed: !content.trim().is_empty(),
        },
        ComplianceCheck {
            name: "documented".into(),
            critical: false,
            passed: documentation_score >= 0.2,
        },
        ComplianceCheck {
            name: "no_open_todo".into(),
            critical: false,
            passed: !has_todo,
        },
        ComplianceCheck {
            name: "units_are_bounded".into(),
            critical: false,
            passed: longest_run <= 120,
        },
    ]
}

fn longest_blankless_run(lines: &[&str]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for line in lines {
        if line.trim().is_empty() {
            longest = longest.max(current);
            current = 0;
        } else {
            current += 1;
        }
    }
    longest.max(current)
}

fn recommend(
    complexity: f32,
    maintainability: f32,
    documentation: f32,
    checks: &[ComplianceCheck],
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if complexity < 0.5 {
        recommendations.push("reduce branching depth by extracting helper functions".to_string());
    }
    if maintainability < 0.5 {
        recommendations.push("split the file; it is too large or has overlong lines".to_string());
    }
    if documentation < 0.3 {
        recommendations.push("document the public surface of this file".to_string());
    }
    for check in checks.iter().filter(|c| !c.passed) {
        recommendations.push(format!("resolve compliance check `{}`", check.name));
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::NodeRuntime;
    use test_case::test_case;

    fn input(content: &str) -> QualityInput {
        QualityInput {
            content: content.into(),
            language: "python".into(),
            last_modified: None,
            reference_time: Utc::now(),
        }
    }

    #[test]
    fn scores_are_bounded_and_weighted() {
        let scorer = QualityScorer::new();
        let report = scorer.score(&input(
            "# A documented module\n\ndef f():\n    # explains the intent\n    return 1\n",
        ));

        for score in [
            report.quality_score,
            report.compliance_score,
            report.complexity_score,
            report.maintainability_score,
            report.documentation_score,
            report.temporal_relevance,
        ] {
            assert!((0.0..=1.0).contains(&score));
        }

        let expected = COMPLEXITY_WEIGHT * report.complexity_score
            + MAINTAINABILITY_WEIGHT * report.maintainability_score
            + DOCUMENTATION_WEIGHT * report.documentation_score
            + TEMPORAL_WEIGHT * report.temporal_relevance;
        assert!((report.quality_score - expected).abs() < 1e-6);
    }

    #[test]
    fn critical_violation_forces_non_compliance() {
        let scorer = QualityScorer::new();
        let report = scorer.score(&input("def f():\n<<<<<<< HEAD\n    pass\n"));
        assert!(!report.onex_compliant);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("no_merge_conflict_markers")));
    }

    #[test]
    fn non_critical_violation_keeps_compliance() {
        let scorer = QualityScorer::new();
        let report = scorer.score(&input(
            "# doc\n# doc\ndef f():\n    pass  # TODO: handle the empty case\n",
        ));
        assert!(report.onex_compliant);
        assert!(report.compliance_score < 1.0);
    }

    #[test]
    fn stale_content_has_lower_temporal_relevance() {
        let now = Utc::now();
        let fresh = temporal(Some(now - chrono::Duration::days(1)), now);
        let old = temporal(Some(now - chrono::Duration::days(800)), now);
        assert!(fresh > 0.9);
        assert!((old - 0.3).abs() < 1e-6);
        assert!((temporal(None, now) - 0.7).abs() < 1e-6);
    }

    #[test_case(0.92, 0.94, Maturity::Production; "production band")]
    #[test_case(0.75, 0.82, Maturity::Stable; "stable band floor")]
    #[test_case(0.85, 0.82, Maturity::Stable; "stable band")]
    #[test_case(0.65, 0.60, Maturity::Beta; "beta band")]
    #[test_case(0.50, 0.85, Maturity::Alpha; "low quality is alpha despite compliance")]
    fn maturity_bands(quality: f32, compliance: f32, expected: Maturity) {
        assert_eq!(Maturity::derive(quality, compliance), expected);
    }

    #[test]
    fn trust_score_is_rounded_percentage() {
        assert_eq!(trust_score(0.92), 92);
        assert_eq!(trust_score(0.005), 1);
        assert_eq!(trust_score(1.5), 100);
    }

    #[tokio::test]
    async fn scorer_dispatches_through_the_runtime() {
        let scorer = QualityScorer::new();
        let runtime = NodeRuntime::new();
        let input = serde_json::to_value(input("# doc\ndef f():\n    pass\n")).unwrap();

        let output = runtime.dispatch(&scorer, "score", input).await.unwrap();
        let report: QualityReport = serde_json::from_value(output).unwrap();
        assert!(report.quality_score > 0.0);

        let err = runtime
            .dispatch(&scorer, "rank", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(_)));
    }
}
