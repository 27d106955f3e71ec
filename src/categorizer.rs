//! Note categorization against the closed taxonomy.
//!
//! The model answers in a loose line format; this module extracts the labels,
//! rejects anything outside the taxonomy, and re-prompts with corrective
//! feedback a bounded number of times. It never fills in a diagnosis the
//! model did not give.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::clients::{GenerationRequest, TextGenerator, backoff_delay_ms};
use crate::codebook::Codebook;
use crate::config::LlmConfig;
use crate::deserializers::is_placeholder;
use crate::diagnosis::{Confidence, DiagnosedGap, Diagnosis};
use crate::error::{CoachError, Result};
use crate::note::Note;
use crate::prompts::{
    CLASSIFICATION_SYSTEM_PROMPT, build_classification_prompt, build_correction_prompt,
};
use crate::taxonomy::{Category, Tier1, Tier2, nearest_label};

/// Trailing parenthetical, e.g. `Assessing risks (high)`
static TRAILING_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<label>.*?)\s*\((?P<note>[^()]*)\)\s*$").expect("valid regex"));

/// Why one attempt's answer could not be accepted
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// The backend could not be reached or failed transiently
    Transport(String),
    /// Labels outside the taxonomy
    InvalidLabels(Vec<String>),
    /// The answer named no category at all
    NoCategories(String),
}

impl AttemptFailure {
    /// Corrective feedback lines for the re-prompt
    pub fn problems(&self) -> Vec<String> {
        match self {
            AttemptFailure::Transport(msg) => vec![msg.clone()],
            AttemptFailure::InvalidLabels(labels) => labels
                .iter()
                .map(|label| match nearest_label(label) {
                    Some(near) => format!(
                        "'{}' is not a taxonomy label (did you mean '{}'?)",
                        label, near
                    ),
                    None => format!("'{}' is not a taxonomy label", label),
                })
                .collect(),
            AttemptFailure::NoCategories(msg) => vec![msg.clone()],
        }
    }
}

/// Labels and reasoning extracted from one model answer
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub gaps: Vec<DiagnosedGap>,
    pub reasoning: Option<String>,
}

pub struct Categorizer {
    generator: Arc<dyn TextGenerator>,
    codebook: Arc<Codebook>,
    max_attempts: u32,
    temperature: f32,
    retry_delay_ms: u64,
    max_tokens: Option<u32>,
}

impl Categorizer {
    pub fn new(generator: Arc<dyn TextGenerator>, codebook: Arc<Codebook>) -> Self {
        let defaults = LlmConfig::default();
        Self::from_config(generator, codebook, &defaults)
    }

    pub fn from_config(
        generator: Arc<dyn TextGenerator>,
        codebook: Arc<Codebook>,
        config: &LlmConfig,
    ) -> Self {
        Self {
            generator,
            codebook,
            max_attempts: config.max_attempts.max(1),
            temperature: config.classify_temperature,
            retry_delay_ms: config.retry_delay_ms,
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    /// Classify a note into a validated diagnosis
    pub async fn categorize(&self, note: &Note) -> Result<Diagnosis> {
        if note.is_blank() {
            return Err(CoachError::ClassificationFailure {
                message: "the note is empty".to_string(),
            });
        }

        let base_prompt = build_classification_prompt(&self.codebook, note);
        let mut prompt = base_prompt.clone();
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 1..=self.max_attempts {
            let start_time = Instant::now();
            let mut request = GenerationRequest::new(prompt.as_str(), self.temperature)
                .with_system(CLASSIFICATION_SYSTEM_PROMPT);
            if let Some(max_tokens) = self.max_tokens {
                request = request.with_max_tokens(max_tokens);
            }

            tracing::debug!(
                note = %note.id,
                attempt,
                backend = self.generator.name(),
                prompt_length = prompt.len(),
                "Requesting classification"
            );

            let answer = match self.generator.generate(&request).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::warn!(
                        note = %note.id,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        error = %e,
                        "Classification call failed"
                    );
                    if !e.is_transient() {
                        return Err(CoachError::CategorizationUnavailable {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                    last_failure = Some(AttemptFailure::Transport(e.to_string()));
                    if attempt < self.max_attempts {
                        let delay_ms = backoff_delay_ms(self.retry_delay_ms, attempt - 1);
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    continue;
                }
            };

            match parse_analysis(&answer) {
                Ok(parsed) => {
                    tracing::info!(
                        note = %note.id,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        gaps = parsed.gaps.len(),
                        "Note categorized"
                    );
                    return Ok(Diagnosis {
                        id: Uuid::new_v4(),
                        note_id: note.id.clone(),
                        gaps: parsed.gaps,
                        reasoning: parsed.reasoning,
                        analysis: answer,
                        codebook_checksum: self.codebook.checksum().to_string(),
                        attempts: attempt,
                        created_at: Utc::now(),
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        note = %note.id,
                        attempt,
                        failure = ?failure,
                        "Classification answer rejected, re-prompting"
                    );
                    prompt = build_correction_prompt(&base_prompt, &answer, &failure.problems());
                    last_failure = Some(failure);
                }
            }
        }

        let attempts = self.max_attempts;
        Err(match last_failure {
            Some(AttemptFailure::InvalidLabels(labels)) => {
                CoachError::InvalidCategory { attempts, labels }
            }
            Some(AttemptFailure::NoCategories(message)) => {
                CoachError::ClassificationFailure { message }
            }
            Some(AttemptFailure::Transport(message)) => {
                CoachError::CategorizationUnavailable { attempts, message }
            }
            None => CoachError::CategorizationUnavailable {
                attempts,
                message: "no attempt was made".to_string(),
            },
        })
    }
}

/// Extract a validated set of gaps from a model answer.
///
/// Accepts the `Tier 1 Categories:` / `Tier 2 Categories:` format and the
/// codebook's single-line `Categories: <tier1> <tier2>` format. Valid labels
/// are accepted in either tier field; a tier-2 label implies its parent.
pub fn parse_analysis(answer: &str) -> std::result::Result<ParsedAnalysis, AttemptFailure> {
    let mut reasoning: Vec<String> = Vec::new();
    let mut in_reasoning = false;
    let mut tier_entries: Vec<String> = Vec::new();
    let mut short_form: Option<String> = None;
    let mut saw_field = false;

    for raw_line in answer.lines() {
        let line = raw_line.trim().trim_start_matches(['*', '#', '-', '>']).trim();
        if let Some(value) = field_value(line, "Reasoning") {
            in_reasoning = true;
            if !value.is_empty() {
                reasoning.push(value.to_string());
            }
        } else if let Some(value) = field_value(line, "Tier 1 Categories")
            .or_else(|| field_value(line, "Tier 2 Categories"))
        {
            in_reasoning = false;
            saw_field = true;
            tier_entries.extend(split_entries(value));
        } else if let Some(value) = field_value(line, "Categories") {
            in_reasoning = false;
            if short_form.is_none() {
                short_form = Some(value.to_string());
            }
        } else if in_reasoning && !line.is_empty() {
            reasoning.push(line.to_string());
        }
    }

    let mut labelled: Vec<(Category, Option<Confidence>)> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();

    if saw_field {
        for entry in tier_entries {
            let (label, confidence) = split_confidence(&entry);
            match parse_entry(label) {
                Some(category) => labelled.push((category, confidence)),
                None => unknown.push(label.to_string()),
            }
        }
    } else if let Some(value) = short_form {
        parse_short_form(&value, &mut labelled, &mut unknown);
    } else {
        return Err(AttemptFailure::NoCategories(
            "the answer did not contain a 'Tier 1 Categories:' line".to_string(),
        ));
    }

    if !unknown.is_empty() {
        let mut distinct: Vec<String> = Vec::with_capacity(unknown.len());
        for label in unknown {
            if !distinct.contains(&label) {
                distinct.push(label);
            }
        }
        return Err(AttemptFailure::InvalidLabels(distinct));
    }

    let gaps = assemble_gaps(&labelled);
    if gaps.is_empty() {
        return Err(AttemptFailure::NoCategories(
            "the answer named no tier 1 category".to_string(),
        ));
    }

    let reasoning = reasoning.join(" ");
    Ok(ParsedAnalysis {
        gaps,
        reasoning: if reasoning.trim().is_empty() {
            None
        } else {
            Some(reasoning.trim().to_string())
        },
    })
}

/// Value after `key:` when the line starts with that key (case-insensitive)
fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let head = line.get(..key.len())?;
    if !head.eq_ignore_ascii_case(key) {
        return None;
    }
    let rest = line[key.len()..].trim_start_matches('*').trim_start();
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim().trim_start_matches('*').trim())
}

fn split_entries(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(|s| s.trim().trim_matches(['[', ']']).trim().to_string())
        .filter(|s| !is_placeholder(s))
        .collect()
}

/// Strip a trailing `(high)`-style confidence; any other parenthetical stays
/// part of the label.
fn split_confidence(entry: &str) -> (&str, Option<Confidence>) {
    if let Some(caps) = TRAILING_PAREN.captures(entry)
        && let (Some(label), Some(note)) = (caps.name("label"), caps.name("note"))
        && let Some(confidence) = Confidence::parse(note.as_str())
    {
        return (label.as_str().trim(), Some(confidence));
    }
    (entry.trim(), None)
}

/// A label, or `Tier1: Tier2` / `Tier1 - Tier2` where the tier-2 part is kept
fn parse_entry(label: &str) -> Option<Category> {
    if let Some(category) = Category::parse(label) {
        return Some(category);
    }
    for sep in [":", " - ", " / ", ">"] {
        if let Some((head, tail)) = label.split_once(sep)
            && head.trim().parse::<Tier1>().is_ok()
            && let Ok(tier2) = tail.trim().parse::<Tier2>()
        {
            return Some(Category::Tier2(tier2));
        }
    }
    None
}

/// `Categories: Cognitive Assessing risks` (or a comma list of any labels)
fn parse_short_form(
    value: &str,
    labelled: &mut Vec<(Category, Option<Confidence>)>,
    unknown: &mut Vec<String>,
) {
    if value.contains(',') || value.contains(';') {
        for entry in split_entries(value) {
            let (label, confidence) = split_confidence(&entry);
            match parse_entry(label) {
                Some(category) => labelled.push((category, confidence)),
                None => unknown.push(label.to_string()),
            }
        }
        return;
    }

    let (body, confidence) = split_confidence(value);
    if let Some(category) = parse_entry(body) {
        labelled.push((category, confidence));
        return;
    }
    let mut words = body.splitn(2, char::is_whitespace);
    let head = words.next().unwrap_or_default();
    let tail = words.next().unwrap_or_default().trim();
    match head.parse::<Tier1>() {
        Ok(tier1) => {
            labelled.push((Category::Tier1(tier1), confidence));
            if !is_placeholder(tail) {
                match tail.parse::<Tier2>() {
                    Ok(tier2) => labelled.push((Category::Tier2(tier2), confidence)),
                    Err(_) => unknown.push(tail.to_string()),
                }
            }
        }
        Err(_) => unknown.push(body.trim().to_string()),
    }
}

/// Pair every tier-2 with its parent and keep lone tier-1 labels, in mention order
fn assemble_gaps(labelled: &[(Category, Option<Confidence>)]) -> Vec<DiagnosedGap> {
    let mut tier1_order: Vec<(Tier1, Option<Confidence>)> = Vec::new();
    let mut tier2_order: Vec<(Tier2, Option<Confidence>)> = Vec::new();

    for (category, confidence) in labelled {
        match category {
            Category::Tier1(t) => {
                if !tier1_order.iter().any(|(x, _)| x == t) {
                    tier1_order.push((*t, *confidence));
                }
            }
            Category::Tier2(t) => {
                if !tier2_order.iter().any(|(x, _)| x == t) {
                    tier2_order.push((*t, *confidence));
                }
            }
        }
    }
    for (tier2, _) in &tier2_order {
        let parent = tier2.parent();
        if !tier1_order.iter().any(|(x, _)| *x == parent) {
            tracing::debug!(tier2 = %tier2, parent = %parent, "Adding implied tier-1 parent");
            tier1_order.push((parent, None));
        }
    }

    let mut gaps = Vec::new();
    for (tier1, tier1_confidence) in tier1_order {
        let children: Vec<&(Tier2, Option<Confidence>)> = tier2_order
            .iter()
            .filter(|(t, _)| t.parent() == tier1)
            .collect();
        if children.is_empty() {
            gaps.push(DiagnosedGap {
                tier1,
                tier2: None,
                confidence: tier1_confidence,
            });
        }
        for (tier2, confidence) in children {
            gaps.push(DiagnosedGap {
                tier1,
                tier2: Some(*tier2),
                confidence: confidence.or(tier1_confidence),
            });
        }
    }
    gaps
}
