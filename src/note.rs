//! CAP note input

use serde::{Deserialize, Serialize};

/// A coach's note about one student: the assessed gap plus context and plan.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Note {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// The coach's assessment of what needs improvement
    #[serde(default)]
    pub gap_text: String,
    /// Context and plan sections
    #[serde(default)]
    pub other_content: String,
}

impl Note {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        gap_text: impl Into<String>,
        other_content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            gap_text: gap_text.into(),
            other_content: other_content.into(),
        }
    }

    /// Build the other-content field from separate context and plan sections
    pub fn from_sections(
        id: impl Into<String>,
        title: impl Into<String>,
        gap_text: impl Into<String>,
        context: &str,
        plan: &str,
    ) -> Self {
        let mut other = String::new();
        if !context.trim().is_empty() {
            other.push_str(&format!("Context: {}", context.trim()));
        }
        if !plan.trim().is_empty() {
            if !other.is_empty() {
                other.push('\n');
            }
            other.push_str(&format!("Plan: {}", plan.trim()));
        }
        Self::new(id, title, gap_text, other)
    }

    /// A note with neither an assessment nor any context carries nothing to classify.
    pub fn is_blank(&self) -> bool {
        self.gap_text.trim().is_empty() && self.other_content.trim().is_empty()
    }

    pub fn to_prompt_text(&self) -> String {
        let mut text = String::new();
        if !self.title.trim().is_empty() {
            text.push_str(&format!("Title: {}\n", self.title.trim()));
        }
        text.push_str(&format!("Gap: {}\n", self.gap_text.trim()));
        if !self.other_content.trim().is_empty() {
            text.push_str(self.other_content.trim());
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_means_no_gap_and_no_context() {
        assert!(Note::new("n1", "Only a title", "  ", "\n").is_blank());
        assert!(!Note::new("n1", "", "Rushes planning", "").is_blank());
        assert!(!Note::new("n1", "", "", "Context: sprint planning").is_blank());
    }

    #[test]
    fn sections_are_labelled_in_prompt_text() {
        let note = Note::from_sections(
            "n1",
            "Planning is too rushed",
            "Not thinking about risks",
            "Sprint planning ignores what is needed",
            "",
        );
        let text = note.to_prompt_text();
        assert!(text.starts_with("Title: Planning is too rushed\nGap: Not thinking about risks\n"));
        assert!(text.contains("Context: Sprint planning ignores what is needed"));
        assert!(!text.contains("Plan:"));
    }
}
