//! Request-scoped result of categorizing one note

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::taxonomy::{Category, Tier1, Tier2};

/// Optional confidence qualifier the model may attach to a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" | "med" | "moderate" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}

/// One diagnosed (tier-1, tier-2) pair. A tier-1 gap may be diagnosed without a subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosedGap {
    pub tier1: Tier1,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier2: Option<Tier2>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: Uuid,
    pub note_id: String,
    pub gaps: Vec<DiagnosedGap>,
    pub reasoning: Option<String>,
    /// Raw model output the gaps were parsed from
    pub analysis: String,
    /// SHA-1 of the codebook the prompt embedded
    pub codebook_checksum: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl Diagnosis {
    /// Every tier-1 and tier-2 label in the diagnosis
    pub fn categories(&self) -> BTreeSet<Category> {
        let mut set = BTreeSet::new();
        for gap in &self.gaps {
            set.insert(Category::Tier1(gap.tier1));
            if let Some(tier2) = gap.tier2 {
                set.insert(Category::Tier2(tier2));
            }
        }
        set
    }

    pub fn tier1(&self) -> BTreeSet<Tier1> {
        self.gaps.iter().map(|g| g.tier1).collect()
    }

    /// Tier-2 labels in diagnosis order, without duplicates
    pub fn tier2(&self) -> Vec<Tier2> {
        let mut out: Vec<Tier2> = Vec::new();
        for tier2 in self.gaps.iter().filter_map(|g| g.tier2) {
            if !out.contains(&tier2) {
                out.push(tier2);
            }
        }
        out
    }

    pub fn tier1_line(&self) -> String {
        join_labels(self.tier1().into_iter().map(|t| t.label()))
    }

    pub fn tier2_line(&self) -> String {
        join_labels(self.tier2().into_iter().map(|t| t.label()))
    }
}

fn join_labels<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    let joined = labels.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "None".to_string()
    } else {
        joined
    }
}
