// Copyright 2025 Cowboy AI, LLC.

//! Pattern subsystem: learned execution patterns, extraction, matching

pub mod learning;
pub mod matcher;
pub mod model;

pub use learning::{
    classify_intent, extract_keywords, CriteriaEvaluation, Gate, PatternExtractor,
    SuccessCriteria,
};
pub use matcher::{
    HookStep, MatchAction, MatchComponents, MatchContext, MatcherConfig, PatternMatch,
    PatternMatcher, ReplayPlan,
};
pub use model::{
    ExecutionPath, Pattern, PatternUsage, PerformanceProfile, UsageOutcome,
};
