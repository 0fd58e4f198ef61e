//! Result merger.
//!
//! Combines the result currently on display with a partial result from a
//! prediction. Each field follows one rule from [`MERGE_RULES`]; an empty
//! incoming value never counts as a write.

use crate::types::{AnalysisResult, NOT_PREDICTED, PartialAnalysisResult, ResultField};

/// How one field of the merged result is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Incoming if present and non-blank, else previous, else [`NOT_PREDICTED`].
    PredictionOrMarker,
    /// Incoming if non-empty, else previous (or empty).
    NonEmptyIncomingWins,
    /// Always previous (or empty); incoming is ignored.
    KeepPrevious,
}

/// Per-field precedence. Every field of `AnalysisResult` appears exactly once.
pub const MERGE_RULES: &[(ResultField, MergeRule)] = &[
    (ResultField::PredictedYield, MergeRule::PredictionOrMarker),
    (ResultField::KeyInsights, MergeRule::NonEmptyIncomingWins),
    (ResultField::TopYieldImpactFactors, MergeRule::NonEmptyIncomingWins),
    (ResultField::OptimizationSuggestions, MergeRule::NonEmptyIncomingWins),
    (ResultField::Visualizations, MergeRule::KeepPrevious),
];

/// Merge `incoming` over `previous`. Total; never fails.
pub fn merge(previous: Option<&AnalysisResult>, incoming: &PartialAnalysisResult) -> AnalysisResult {
    let mut merged = AnalysisResult::default();
    for &(field, rule) in MERGE_RULES {
        apply_rule(&mut merged, field, rule, previous, incoming);
    }
    merged
}

fn apply_rule(
    merged: &mut AnalysisResult,
    field: ResultField,
    rule: MergeRule,
    previous: Option<&AnalysisResult>,
    incoming: &PartialAnalysisResult,
) {
    match (field, rule) {
        (ResultField::PredictedYield, MergeRule::PredictionOrMarker) => {
            let fresh = incoming
                .predicted_yield
                .as_ref()
                .filter(|v| !v.trim().is_empty());
            merged.predicted_yield = Some(
                fresh
                    .or_else(|| previous.and_then(|p| p.predicted_yield.as_ref()))
                    .cloned()
                    .unwrap_or_else(|| NOT_PREDICTED.to_string()),
            );
        }
        (ResultField::Visualizations, MergeRule::KeepPrevious) => {
            merged.visualizations = previous.map(|p| p.visualizations.clone()).unwrap_or_default();
        }
        (field, rule) => {
            let prior = previous.and_then(|p| p.list(field));
            let fresh = incoming.list(field);
            let chosen = match rule {
                MergeRule::NonEmptyIncomingWins => fresh.filter(|l| !l.is_empty()).or(prior),
                MergeRule::KeepPrevious => prior,
                MergeRule::PredictionOrMarker => fresh.or(prior),
            };
            if let (Some(target), Some(source)) = (merged.list_mut(field), chosen) {
                target.clone_from(source);
            }
        }
    }
}
