//! Historical case library.
//!
//! Cases are loaded once, validated record by record, and never change
//! afterwards. A single malformed record rejects the whole file so a bad
//! weight or a misspelled label is caught at startup instead of silently
//! skewing similarity scores later.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::deserializers::{de_label_list, de_weight_map};
use crate::error::{CoachError, Result};
use crate::taxonomy::{Category, Tier1, Tier2};

/// Weight given to an assigned category the curator did not weight explicitly
pub const DEFAULT_CATEGORY_WEIGHT: f64 = 1.0;

/// A case exactly as it appears in the JSON file
#[derive(Debug, Clone, Deserialize)]
pub struct CaseRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub gap_text: String,
    #[serde(default)]
    pub other_content: String,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default, deserialize_with = "de_label_list")]
    pub tier1_categories: Vec<String>,
    #[serde(default, deserialize_with = "de_label_list")]
    pub tier2_categories: Vec<String>,
    #[serde(default, deserialize_with = "de_weight_map")]
    pub weights: BTreeMap<String, f64>,
}

/// A validated, read-only precedent case
#[derive(Debug, Clone, Serialize)]
pub struct Case {
    pub id: String,
    pub project: Option<String>,
    pub gap_text: String,
    pub other_content: String,
    pub original_text: Option<String>,
    pub tier1: BTreeSet<Tier1>,
    pub tier2: BTreeSet<Tier2>,
    weights: BTreeMap<Category, f64>,
}

impl Case {
    /// Assigned categories at both tiers
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.weights.keys().copied()
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.weights.contains_key(&category)
    }

    /// Curated weight for an assigned category, `None` when unassigned
    pub fn weight(&self, category: Category) -> Option<f64> {
        self.weights.get(&category).copied()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn project_name(&self) -> &str {
        self.project.as_deref().unwrap_or("N/A")
    }

    /// Context/assessment/plan text used when seeding generation prompts
    pub fn descriptive_text(&self) -> String {
        let mut text = format!("Gap: {}", self.gap_text.trim());
        if !self.other_content.trim().is_empty() {
            text.push('\n');
            text.push_str(self.other_content.trim());
        }
        text
    }

    pub fn tier1_line(&self) -> String {
        self.tier1
            .iter()
            .map(|t| t.label())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn tier2_line(&self) -> String {
        self.tier2
            .iter()
            .map(|t| t.label())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn from_record(record: CaseRecord) -> Result<Self> {
        let id = record.id.trim().to_string();
        if id.is_empty() {
            return Err(CoachError::case_store("<missing>", "case id is empty"));
        }

        let mut tier1 = BTreeSet::new();
        for label in &record.tier1_categories {
            let parsed: Tier1 = label.parse().map_err(|_| {
                CoachError::case_store(&id, format!("unknown tier-1 category '{}'", label))
            })?;
            tier1.insert(parsed);
        }
        if tier1.is_empty() {
            return Err(CoachError::case_store(&id, "no tier-1 category assigned"));
        }

        let mut tier2 = BTreeSet::new();
        for label in &record.tier2_categories {
            let parsed: Tier2 = label.parse().map_err(|_| {
                CoachError::case_store(&id, format!("unknown tier-2 category '{}'", label))
            })?;
            if !tier1.contains(&parsed.parent()) {
                return Err(CoachError::case_store(
                    &id,
                    format!(
                        "tier-2 category '{}' requires tier-1 parent '{}'",
                        parsed,
                        parsed.parent()
                    ),
                ));
            }
            tier2.insert(parsed);
        }

        let mut weights: BTreeMap<Category, f64> = tier1
            .iter()
            .map(|t| Category::Tier1(*t))
            .chain(tier2.iter().map(|t| Category::Tier2(*t)))
            .map(|c| (c, DEFAULT_CATEGORY_WEIGHT))
            .collect();

        for (label, weight) in &record.weights {
            let category: Category = label.parse().map_err(|_| {
                CoachError::case_store(&id, format!("weight for unknown category '{}'", label))
            })?;
            if !weights.contains_key(&category) {
                return Err(CoachError::case_store(
                    &id,
                    format!("weight for unassigned category '{}'", category),
                ));
            }
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(CoachError::case_store(
                    &id,
                    format!("weight for '{}' must be a positive number, got {}", category, weight),
                ));
            }
            weights.insert(category, *weight);
        }

        Ok(Self {
            id,
            project: record.project.filter(|p| !p.trim().is_empty()),
            gap_text: record.gap_text,
            other_content: record.other_content,
            original_text: record.original_text,
            tier1,
            tier2,
            weights,
        })
    }
}

/// Immutable collection of validated cases
#[derive(Debug, Clone, Default)]
pub struct CaseStore {
    cases: Vec<Case>,
    by_id: HashMap<String, usize>,
}

impl CaseStore {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoachError::Io {
            message: format!("reading case store {}: {}", path.display(), e),
        })?;
        let store = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            cases = store.len(),
            "Case store loaded"
        );
        Ok(store)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let records: Vec<CaseRecord> = serde_json::from_str(content)?;
        Self::from_records(records)
    }

    pub fn from_records(records: Vec<CaseRecord>) -> Result<Self> {
        let mut cases = Vec::with_capacity(records.len());
        let mut by_id = HashMap::with_capacity(records.len());
        for record in records {
            let case = Case::from_record(record)?;
            if by_id.insert(case.id.clone(), cases.len()).is_some() {
                return Err(CoachError::case_store(&case.id, "duplicate case id"));
            }
            cases.push(case);
        }
        Ok(Self { cases, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Case> {
        self.by_id.get(id.trim()).map(|&i| &self.cases[i])
    }

    pub fn require(&self, id: &str) -> Result<&Case> {
        self.get(id).ok_or_else(|| CoachError::CaseNotFound {
            case_id: id.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Case> {
        self.cases.iter()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(json: &str) -> Result<CaseStore> {
        CaseStore::from_json_str(json)
    }

    fn rejection(json: &str) -> String {
        match load(json) {
            Err(CoachError::CaseStore { message, .. }) => message,
            other => panic!("expected case store error, got {:?}", other),
        }
    }

    #[test]
    fn loads_string_and_array_category_forms() {
        let store = load(
            r#"[
                {"id": "01", "gap_text": "g", "tier1_categories": "Cognitive",
                 "tier2_categories": "Assessing risks", "weights": {"Assessing risks": 3}},
                {"id": "02", "gap_text": "g", "tier1_categories": ["Metacognitive", "Emotional"],
                 "tier2_categories": ["Fears and anxieties"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(store.len(), 2);

        let first = store.get("01").unwrap();
        assert_eq!(first.weight(Category::Tier2(Tier2::AssessingRisks)), Some(3.0));
        assert_eq!(
            first.weight(Category::Tier1(Tier1::Cognitive)),
            Some(DEFAULT_CATEGORY_WEIGHT)
        );
        assert_eq!(first.total_weight(), 4.0);

        let second = store.get("02").unwrap();
        assert_eq!(second.categories().count(), 3);
        assert!(second.weight(Category::Tier2(Tier2::AssessingRisks)).is_none());
    }

    #[test]
    fn rejects_unknown_labels() {
        let msg = rejection(r#"[{"id": "x", "tier1_categories": "Spiritual"}]"#);
        assert!(msg.contains("Spiritual"));
        let msg = rejection(
            r#"[{"id": "x", "tier1_categories": "Cognitive", "tier2_categories": "Guessing"}]"#,
        );
        assert!(msg.contains("Guessing"));
    }

    #[test]
    fn rejects_orphan_tier2() {
        let msg = rejection(
            r#"[{"id": "x", "tier1_categories": "Emotional", "tier2_categories": "Assessing risks"}]"#,
        );
        assert!(msg.contains("Cognitive"));
    }

    #[test]
    fn rejects_bad_weights() {
        rejection(
            r#"[{"id": "x", "tier1_categories": "Cognitive", "weights": {"Emotional": 1}}]"#,
        );
        rejection(
            r#"[{"id": "x", "tier1_categories": "Cognitive", "weights": {"Cognitive": 0}}]"#,
        );
        rejection(
            r#"[{"id": "x", "tier1_categories": "Cognitive", "weights": {"Cognitive": -2}}]"#,
        );
    }

    #[test]
    fn rejects_missing_tier1_empty_id_and_duplicates() {
        rejection(r#"[{"id": "x", "tier1_categories": ""}]"#);
        rejection(r#"[{"id": " ", "tier1_categories": "Cognitive"}]"#);
        let msg = rejection(
            r#"[{"id": "a", "tier1_categories": "Cognitive"},
                {"id": "a", "tier1_categories": "Emotional"}]"#,
        );
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn require_reports_missing_case() {
        let store = load(r#"[{"id": "a", "tier1_categories": "Cognitive"}]"#).unwrap();
        assert!(store.require(" a ").is_ok());
        assert!(matches!(
            store.require("b"),
            Err(CoachError::CaseNotFound { .. })
        ));
    }
}
