//! Personalized practice-plan rendering.
//!
//! Each placeholder is filled by its own generation call, in document order.
//! A render either fills every placeholder or fails as a whole.

use std::sync::Arc;
use std::time::Instant;

use crate::cases::Case;
use crate::clients::{GenerationError, GenerationRequest, TextGenerator};
use crate::config::LlmConfig;
use crate::diagnosis::Diagnosis;
use crate::error::{CoachError, Result};
use crate::note::Note;
use crate::prompts::{
    RENDER_SYSTEM_PROMPT, RenderContext, build_placeholder_prompt, build_strategies_prompt,
};
use crate::template::{
    Placeholder, Template, block_start, fence_run, heading_text, setext_underline,
};

pub struct TemplateRenderer {
    generator: Arc<dyn TextGenerator>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl TemplateRenderer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self::from_config(generator, &LlmConfig::default())
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self {
            generator,
            temperature: config.render_temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Fill every placeholder of `template` for this note, diagnosis and case
    pub async fn render(
        &self,
        note: &Note,
        diagnosis: &Diagnosis,
        case: &Case,
        template: &Template,
    ) -> Result<String> {
        let start_time = Instant::now();
        let ctx = RenderContext {
            note,
            diagnosis,
            case,
        };

        let mut fills = Vec::with_capacity(template.placeholder_count());
        for (index, placeholder) in template.placeholders().enumerate() {
            let fill = self.fill_placeholder(&ctx, placeholder).await.map_err(|e| {
                tracing::warn!(
                    template = template.name(),
                    placeholder = index,
                    case = %case.id,
                    error = %e,
                    "Placeholder generation failed"
                );
                CoachError::RenderingFailure {
                    message: format!("placeholder '{}': {}", placeholder.instruction, e),
                }
            })?;
            fills.push(fill);
        }

        let document = template
            .fill(&fills)
            .ok_or_else(|| CoachError::RenderingFailure {
                message: "placeholder count changed while rendering".to_string(),
            })?;

        tracing::info!(
            template = template.name(),
            case = %case.id,
            placeholders = fills.len(),
            elapsed_ms = start_time.elapsed().as_millis(),
            "Template rendered"
        );
        Ok(document)
    }

    /// The "How This Applies To You" strategy list for one case
    pub async fn application_strategies(
        &self,
        note: &Note,
        diagnosis: &Diagnosis,
        case: &Case,
    ) -> Result<String> {
        let ctx = RenderContext {
            note,
            diagnosis,
            case,
        };
        let request = self.request(build_strategies_prompt(&ctx));
        let text = self
            .generator
            .generate(&request)
            .await
            .map_err(|e| CoachError::RenderingFailure {
                message: format!("application strategies: {}", e),
            })?;
        Ok(sanitize_fill(text.trim()))
    }

    async fn fill_placeholder(
        &self,
        ctx: &RenderContext<'_>,
        placeholder: &Placeholder,
    ) -> std::result::Result<String, GenerationError> {
        let prompt = build_placeholder_prompt(
            ctx,
            placeholder.section.as_deref(),
            &placeholder.instruction,
            &placeholder.line,
        );
        let text = self.generator.generate(&self.request(prompt)).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(sanitize_fill(text))
    }

    fn request(&self, prompt: String) -> GenerationRequest {
        let request =
            GenerationRequest::new(prompt, self.temperature).with_system(RENDER_SYSTEM_PROMPT);
        match self.max_tokens {
            Some(max_tokens) => request.with_max_tokens(max_tokens),
            None => request,
        }
    }
}

/// Neutralize block syntax in generated text so a fill cannot add, hide or
/// rename a skeleton section. `#` headings become bold text. Code fences,
/// setext underlines and raw HTML openers are backslash-escaped.
pub fn sanitize_fill(text: &str) -> String {
    text.lines().map(sanitize_line).collect::<Vec<_>>().join("\n")
}

fn sanitize_line(line: &str) -> String {
    let Some((indent, body)) = block_start(line) else {
        return line.to_string();
    };
    if let Some(heading) = heading_text(line) {
        return if heading.is_empty() {
            String::new()
        } else {
            format!("**{}**", heading.trim_matches('*'))
        };
    }
    if fence_run(line).is_some() || setext_underline(line).is_some() || body.starts_with('<') {
        return format!("{}\\{}", indent, body);
    }
    line.to_string()
}

/// Download name for a rendered plan, e.g. `practice_template_Sample_Project.md`.
///
/// Uses the case's project, or `fallback` (usually the note title) when the
/// case has none.
pub fn output_file_name(case: &Case, fallback: &str) -> String {
    let project = case
        .project
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(fallback);
    let cleaned: String = project
        .trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' => Some(c),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        format!("practice_template_{}.md", case.id)
    } else {
        format!("practice_template_{}.md", cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::CaseStore;
    use crate::clients::ScriptedGenerator;
    use crate::diagnosis::DiagnosedGap;
    use crate::taxonomy::{Tier1, Tier2};
    use crate::template::headings_of;
    use chrono::Utc;
    use uuid::Uuid;

    fn fixtures() -> (Note, Diagnosis, CaseStore) {
        let note = Note::new("n1", "Mockups first", "Polishes screens before users", "");
        let diagnosis = Diagnosis {
            id: Uuid::new_v4(),
            note_id: "n1".into(),
            gaps: vec![DiagnosedGap {
                tier1: Tier1::Cognitive,
                tier2: Some(Tier2::AssessingRisks),
                confidence: None,
            }],
            reasoning: Some("risk".into()),
            analysis: String::new(),
            codebook_checksum: String::new(),
            attempts: 1,
            created_at: Utc::now(),
        };
        let store = CaseStore::from_json_str(
            r#"[{"id": "03", "project": "John Doe / v2", "gap_text": "Polished mockups, unknown audience",
                 "tier1_categories": "Cognitive", "tier2_categories": "Assessing risks"}]"#,
        )
        .unwrap();
        (note, diagnosis, store)
    }

    #[tokio::test]
    async fn fills_placeholders_in_order_and_keeps_headings() {
        let (note, diagnosis, store) = fixtures();
        let case = store.get("03").unwrap();
        let template = Template::parse(
            "t.md",
            "# Plan\n\n## Gap\n\nYou tend to [pattern].\n\n## Links\n\nRead [this](https://x.y).\n\n## Case\n\n[connect]\n",
        );
        let generator = Arc::new(ScriptedGenerator::with_replies([
            "  rush into visuals  ",
            "## Case Notes\nJohn did the same.",
        ]));
        let renderer = TemplateRenderer::new(generator.clone());
        let out = renderer
            .render(&note, &diagnosis, case, &template)
            .await
            .unwrap();

        assert_eq!(
            out,
            "# Plan\n\n## Gap\n\nYou tend to rush into visuals.\n\n## Links\n\nRead [this](https://x.y).\n\n## Case\n\n**Case Notes**\nJohn did the same.\n"
        );
        assert_eq!(headings_of(&out), template.headings());

        let requests = generator.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].prompt.contains("- Section: Gap"));
        assert!(requests[0].prompt.contains("- Placeholder: [pattern]"));
        assert!(requests[0].prompt.contains("Polished mockups, unknown audience"));
        assert!(requests[1].prompt.contains("- Section: Case"));
    }

    #[tokio::test]
    async fn any_failed_fill_fails_the_render() {
        let (note, diagnosis, store) = fixtures();
        let case = store.get("03").unwrap();
        let template = Template::parse("t.md", "[one]\n[two]\n[three]\n");
        let generator = Arc::new(ScriptedGenerator::with_replies(["first"]));
        generator.push_error(GenerationError::Status {
            status: 500,
            body: "boom".into(),
        });
        let err = TemplateRenderer::new(generator.clone())
            .render(&note, &diagnosis, case, &template)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::RenderingFailure { .. }));
        assert_eq!(generator.request_count(), 2);
    }

    #[tokio::test]
    async fn blank_fill_is_a_failure() {
        let (note, diagnosis, store) = fixtures();
        let case = store.get("03").unwrap();
        let template = Template::parse("t.md", "[one]\n");
        let generator = Arc::new(ScriptedGenerator::with_replies(["   "]));
        let err = TemplateRenderer::new(generator)
            .render(&note, &diagnosis, case, &template)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::RenderingFailure { .. }));
    }

    #[tokio::test]
    async fn strategies_use_one_call() {
        let (note, diagnosis, store) = fixtures();
        let case = store.get("03").unwrap();
        let generator = Arc::new(ScriptedGenerator::with_replies([
            "• **Name the unknowns**\n  List what you do not know yet.",
        ]));
        let text = TemplateRenderer::new(generator.clone())
            .application_strategies(&note, &diagnosis, case)
            .await
            .unwrap();
        assert!(text.starts_with("• **Name the unknowns**"));
        assert!(generator.requests()[0].prompt.contains("4-5 specific strategies"));
    }

    #[test]
    fn demotes_generated_headings() {
        assert_eq!(sanitize_fill("# Big\ntext\n### **Small**"), "**Big**\ntext\n**Small**");
        assert_eq!(sanitize_fill("#\nx"), "\nx");
    }

    #[test]
    fn escapes_fences_underlines_and_html() {
        assert_eq!(
            sanitize_fill("Try:\n```text\nstep\n  ~~~\nKey\n=====\nSub\n---\n<pre>"),
            "Try:\n\\```text\nstep\n  \\~~~\nKey\n\\=====\nSub\n\\---\n\\<pre>"
        );
        // Inline code and indented code are left alone
        assert_eq!(sanitize_fill("use `x`\n    ```"), "use `x`\n    ```");
    }

    const SECTIONED: &str = "# Plan\n\n## Gap\n\n[pattern]\n\n## Case\n\n## Reflect\n";

    async fn render_single_fill(fill: &str) -> (Template, String) {
        let (note, diagnosis, store) = fixtures();
        let case = store.get("03").unwrap();
        let template = Template::parse("t.md", SECTIONED);
        let generator = Arc::new(ScriptedGenerator::with_replies([fill]));
        let out = TemplateRenderer::new(generator)
            .render(&note, &diagnosis, case, &template)
            .await
            .unwrap();
        (template, out)
    }

    #[tokio::test]
    async fn unclosed_fence_in_fill_keeps_later_sections() {
        let fill = "Try this:\n```text\nstep one";
        let template = Template::parse("t.md", SECTIONED);
        let raw = template.fill(&[fill.to_string()]).unwrap();
        assert_eq!(headings_of(&raw), vec!["# Plan", "## Gap"]);

        let (template, out) = render_single_fill(fill).await;
        assert_eq!(headings_of(&out), template.headings());
        assert!(out.contains("step one"));
    }

    #[tokio::test]
    async fn underline_in_fill_adds_no_section() {
        let fill = "Key Pattern\n===========\nYou rush.";
        let template = Template::parse("t.md", SECTIONED);
        let raw = template.fill(&[fill.to_string()]).unwrap();
        assert!(headings_of(&raw).contains(&"# Key Pattern".to_string()));

        let (template, out) = render_single_fill(fill).await;
        assert_eq!(headings_of(&out), template.headings());
        assert!(out.contains("Key Pattern\n\\===========\nYou rush."));
    }

    #[test]
    fn file_name_is_path_safe() {
        let (_, _, store) = fixtures();
        let case = store.get("03").unwrap();
        assert_eq!(output_file_name(case, "ignored"), "practice_template_John_Doe__v2.md");

        let bare = CaseStore::from_json_str(
            r#"[{"id": "09", "gap_text": "g", "tier1_categories": "Emotional"}]"#,
        )
        .unwrap();
        let case = bare.get("09").unwrap();
        assert_eq!(output_file_name(case, "My Note"), "practice_template_My_Note.md");
        assert_eq!(output_file_name(case, "///"), "practice_template_09.md");
    }
}
