//! Weighted category-overlap ranking of precedent cases

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::cases::{Case, CaseStore};
use crate::diagnosis::Diagnosis;
use crate::taxonomy::Category;

/// A case with its similarity to one diagnosis
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCase<'a> {
    pub case: &'a Case,
    /// Sum of the case's weights over the categories it shares with the diagnosis
    pub score: f64,
    /// Shared categories, in taxonomy order
    pub matched: Vec<Category>,
    /// `score` as a fraction of the case's total weight; informational only
    pub coverage: f64,
}

/// Score a single case against a set of diagnosed categories
pub fn score_case<'a>(case: &'a Case, diagnosed: &BTreeSet<Category>) -> ScoredCase<'a> {
    let mut score = 0.0;
    let mut matched = Vec::new();
    for category in diagnosed {
        if let Some(weight) = case.weight(*category) {
            score += weight;
            matched.push(*category);
        }
    }
    let total = case.total_weight();
    let coverage = if total > 0.0 { score / total } else { 0.0 };
    ScoredCase {
        case,
        score,
        matched,
        coverage,
    }
}

/// Rank every case sharing at least one category with the diagnosis.
///
/// Highest score first; equal scores fall back to ascending case id so the
/// order never depends on load order. `top_k == 0` returns every match.
pub fn rank<'a>(diagnosis: &Diagnosis, store: &'a CaseStore, top_k: usize) -> Vec<ScoredCase<'a>> {
    let diagnosed = diagnosis.categories();
    let mut scored: Vec<ScoredCase<'a>> = store
        .iter()
        .map(|case| score_case(case, &diagnosed))
        .filter(|s| s.score > 0.0)
        .collect();

    scored.sort_by(compare);
    if top_k > 0 {
        scored.truncate(top_k);
    }

    tracing::debug!(
        diagnosis = %diagnosis.id,
        categories = diagnosed.len(),
        candidates = store.len(),
        returned = scored.len(),
        "Ranked similar cases"
    );
    scored
}

fn compare(a: &ScoredCase<'_>, b: &ScoredCase<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.case.id.cmp(&b.case.id))
}
