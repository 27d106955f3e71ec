//! The closed two-level regulation-gap taxonomy.
//!
//! Tier-1 categories are the broad kind of gap; every tier-2 label belongs to
//! exactly one tier-1 parent. Nothing can be added at runtime.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint
const NEAREST_LABEL_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier1 {
    Cognitive,
    Metacognitive,
    Emotional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier2 {
    RepresentingProblemAndSolutionSpaces,
    AssessingRisks,
    CriticalThinkingAndArgumentation,
    FormingFeasiblePlans,
    PlanningEffectiveIterations,
    LeveragingResourcesAndSeekingHelp,
    FearsAndAnxieties,
    EmbracingChallengesAndLearning,
}

impl Tier1 {
    pub const ALL: [Tier1; 3] = [Tier1::Cognitive, Tier1::Metacognitive, Tier1::Emotional];

    pub fn label(self) -> &'static str {
        match self {
            Tier1::Cognitive => "Cognitive",
            Tier1::Metacognitive => "Metacognitive",
            Tier1::Emotional => "Emotional",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tier1::Cognitive => "The student lacks skills for approaching problems with an unknown answer",
            Tier1::Metacognitive => {
                "The student struggles in areas of planning, help-seeking and collaboration"
            }
            Tier1::Emotional => {
                "The student has regulation issues that affect motivation and learning"
            }
        }
    }

    pub fn children(self) -> &'static [Tier2] {
        match self {
            Tier1::Cognitive => &[
                Tier2::RepresentingProblemAndSolutionSpaces,
                Tier2::AssessingRisks,
                Tier2::CriticalThinkingAndArgumentation,
            ],
            Tier1::Metacognitive => &[
                Tier2::FormingFeasiblePlans,
                Tier2::PlanningEffectiveIterations,
                Tier2::LeveragingResourcesAndSeekingHelp,
            ],
            Tier1::Emotional => &[
                Tier2::FearsAndAnxieties,
                Tier2::EmbracingChallengesAndLearning,
            ],
        }
    }
}

impl Tier2 {
    pub const ALL: [Tier2; 8] = [
        Tier2::RepresentingProblemAndSolutionSpaces,
        Tier2::AssessingRisks,
        Tier2::CriticalThinkingAndArgumentation,
        Tier2::FormingFeasiblePlans,
        Tier2::PlanningEffectiveIterations,
        Tier2::LeveragingResourcesAndSeekingHelp,
        Tier2::FearsAndAnxieties,
        Tier2::EmbracingChallengesAndLearning,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Tier2::RepresentingProblemAndSolutionSpaces => {
                "Representing problem and solution spaces"
            }
            Tier2::AssessingRisks => "Assessing risks",
            Tier2::CriticalThinkingAndArgumentation => "Critical thinking and argumentation",
            Tier2::FormingFeasiblePlans => "Forming feasible plans",
            Tier2::PlanningEffectiveIterations => "Planning effective iterations",
            Tier2::LeveragingResourcesAndSeekingHelp => "Leveraging resources and seeking help",
            Tier2::FearsAndAnxieties => "Fears and anxieties",
            Tier2::EmbracingChallengesAndLearning => "Embracing challenges and learning",
        }
    }

    pub fn parent(self) -> Tier1 {
        match self {
            Tier2::RepresentingProblemAndSolutionSpaces
            | Tier2::AssessingRisks
            | Tier2::CriticalThinkingAndArgumentation => Tier1::Cognitive,
            Tier2::FormingFeasiblePlans
            | Tier2::PlanningEffectiveIterations
            | Tier2::LeveragingResourcesAndSeekingHelp => Tier1::Metacognitive,
            Tier2::FearsAndAnxieties | Tier2::EmbracingChallengesAndLearning => Tier1::Emotional,
        }
    }

    /// File-name friendly form, e.g. `assessing_risks`
    pub fn slug(self) -> String {
        self.label().to_lowercase().replace(' ', "_")
    }
}

/// A single taxonomy label at either tier.
///
/// Case weights and matching operate on categories, so a case can weight a
/// broad tier-1 match differently from a precise tier-2 match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Tier1(Tier1),
    Tier2(Tier2),
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Tier1(t) => t.label(),
            Category::Tier2(t) => t.label(),
        }
    }

    /// The tier-1 category this label rolls up to
    pub fn tier1(self) -> Tier1 {
        match self {
            Category::Tier1(t) => t,
            Category::Tier2(t) => t.parent(),
        }
    }

    pub fn all() -> impl Iterator<Item = Category> {
        Tier1::ALL
            .into_iter()
            .map(Category::Tier1)
            .chain(Tier2::ALL.into_iter().map(Category::Tier2))
    }

    /// Parse a label, tolerating case, spacing and trailing punctuation only.
    pub fn parse(raw: &str) -> Option<Category> {
        let wanted = normalize_label(raw);
        if wanted.is_empty() {
            return None;
        }
        Category::all().find(|c| normalize_label(c.label()) == wanted)
    }
}

impl fmt::Display for Tier1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for Tier2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label that is not part of the taxonomy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown taxonomy label '{0}'")]
pub struct UnknownLabel(pub String);

impl FromStr for Category {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse(s).ok_or_else(|| UnknownLabel(s.trim().to_string()))
    }
}

impl FromStr for Tier1 {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Category::parse(s) {
            Some(Category::Tier1(t)) => Ok(t),
            _ => Err(UnknownLabel(s.trim().to_string())),
        }
    }
}

impl FromStr for Tier2 {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Category::parse(s) {
            Some(Category::Tier2(t)) => Ok(t),
            _ => Err(UnknownLabel(s.trim().to_string())),
        }
    }
}

macro_rules! label_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

label_serde!(Tier1);
label_serde!(Tier2);
label_serde!(Category);

/// Lowercase, collapse whitespace, strip list/markdown decoration and trailing punctuation.
pub fn normalize_label(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_start_matches(['-', '*', '•', '"', '\'', '`'])
        .trim_end_matches(['.', ',', ';', ':', '*', '"', '\'', '`'])
        .replace('&', " and ");
    trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Closest valid label for an unknown one, used only to phrase corrective feedback.
pub fn nearest_label(raw: &str) -> Option<&'static str> {
    let wanted = normalize_label(raw);
    Category::all()
        .map(|c| (c, strsim::jaro_winkler(&wanted, &normalize_label(c.label()))))
        .filter(|(_, score)| *score >= NEAREST_LABEL_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c.label())
}

/// Human-readable outline of the whole taxonomy, numbered like the codebook.
pub fn outline() -> String {
    let mut out = String::new();
    for (i, tier1) in Tier1::ALL.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}: {}\n",
            i + 1,
            tier1.label(),
            tier1.description()
        ));
        for tier2 in tier1.children() {
            out.push_str(&format!("   - {}\n", tier2.label()));
        }
    }
    out
}
