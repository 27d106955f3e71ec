//! Prompts for classification and template rendering

use crate::cases::Case;
use crate::codebook::Codebook;
use crate::diagnosis::Diagnosis;
use crate::note::Note;
use crate::taxonomy;

/// System prompt for regulation-gap classification
pub const CLASSIFICATION_SYSTEM_PROMPT: &str = r#"You are analyzing a student's learning regulation gap for a coach.

## Critical Rules

1. **Use only the labels of the taxonomy, spelled exactly as given.** Never invent a category.
2. **Focus primarily (about 80%) on the assessment (Gap) part of the note.** It is the coach's perceived regulation gap. Context and plan only disambiguate.
3. **Categorize the gap, not its implications.**
4. **Every note describes at least one gap.** Always name at least one tier 1 category.

## Output Format

Reasoning: <your step-by-step reasoning on one line>
Tier 1 Categories: <comma-separated tier 1 labels>
Tier 2 Categories: <comma-separated tier 2 labels, or None>

A label may carry a confidence in parentheses, e.g. `Assessing risks (high)`. Allowed confidences: high, medium, low.
"#;

/// System prompt for filling template placeholders
pub const RENDER_SYSTEM_PROMPT: &str = r#"You are a learning coach writing one part of a personalized learning plan for a student.

## Output Requirements

- Write only the text that replaces the placeholder. No preamble, no headings, no surrounding quotes.
- Address the student directly ("you").
- Ground what you write in the student's note and the similar case. Do not invent facts about the student.
- Match the shape the placeholder implies: a sentence fragment continues the surrounding sentence, a list item is a single item, a section placeholder is one or two short paragraphs.
"#;

/// Build the classification prompt for a note
pub fn build_classification_prompt(codebook: &Codebook, note: &Note) -> String {
    format!(
        r#"Based on the following codebook:

{}

## Taxonomy

{}
## Student Note

{}
---

First, provide your step-by-step reasoning, then list the categories that apply.

Provide your response in this format:
Reasoning: [your step-by-step reasoning]
Tier 1 Categories: [comma-separated categories]
Tier 2 Categories: [comma-separated subcategories]"#,
        codebook.text().trim(),
        taxonomy::outline(),
        note.to_prompt_text().trim()
    )
}

/// Re-prompt after an answer that could not be accepted
pub fn build_correction_prompt(original: &str, previous_answer: &str, problems: &[String]) -> String {
    let listed = problems
        .iter()
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"{original}

## Your Previous Answer

{}

## Why It Was Rejected

{listed}

Answer again in the required format, using only labels from the taxonomy above, spelled exactly as written."#,
        previous_answer.trim()
    )
}

/// Shared request context for every generation call of one render
pub struct RenderContext<'a> {
    pub note: &'a Note,
    pub diagnosis: &'a Diagnosis,
    pub case: &'a Case,
}

impl RenderContext<'_> {
    fn preamble(&self) -> String {
        format!(
            r#"## Student's Note

{}

## Diagnosis
- Tier 1 Categories: {}
- Tier 2 Categories: {}
- Reasoning: {}

## Similar Case Study
- ID: {}
- Project: {}
- Tier 1 Categories: {}
- Tier 2 Categories: {}

{}"#,
            self.note.to_prompt_text().trim(),
            self.diagnosis.tier1_line(),
            self.diagnosis.tier2_line(),
            self.diagnosis.reasoning.as_deref().unwrap_or("N/A"),
            self.case.id,
            self.case.project_name(),
            self.case.tier1_line(),
            self.case.tier2_line(),
            self.case.descriptive_text()
        )
    }
}

/// Build the prompt that fills one placeholder span
pub fn build_placeholder_prompt(
    ctx: &RenderContext<'_>,
    section: Option<&str>,
    instruction: &str,
    line: &str,
) -> String {
    format!(
        r#"{}

## Placeholder To Fill
- Section: {}
- Placeholder: [{}]
- Line it appears on: {}

Write the replacement text for this placeholder only."#,
        ctx.preamble(),
        section.unwrap_or("(document introduction)"),
        instruction.trim(),
        line.trim()
    )
}

/// Build the "How This Applies To You" strategies prompt
pub fn build_strategies_prompt(ctx: &RenderContext<'_>) -> String {
    format!(
        r#"Based on this student's regulation gap diagnosis and the similar case, generate 4-5 specific strategies for how they can apply lessons from the similar case to their situation.

{}

Format your response as a bulleted list with 4-5 strategies. Each strategy should have:
- A bold headline (1-5 words)
- A brief explanation (1-2 sentences)

Example format:
• **Slow down and deepen understanding**
  Before moving on to new work, make sure you've thoroughly understood current topics."#,
        ctx.preamble()
    )
}
