//! Markdown practice-plan skeletons and their placeholder spans.
//!
//! A placeholder is a single-line `[...]` span. Markdown links, images,
//! checkboxes, heading lines and fenced code are static text and are never
//! sent to the model.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::{CoachError, Result};
use crate::taxonomy::Tier2;

pub const BASE_TEMPLATE: &str = "base_template.md";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (BASE_TEMPLATE, include_str!("../templates/base_template.md")),
    (
        "assessing_risks_template.md",
        include_str!("../templates/assessing_risks_template.md"),
    ),
];

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]\n]+)\](\(|\[)?").expect("valid regex"));

/// A span the renderer replaces with generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Text between the brackets
    pub instruction: String,
    /// Nearest heading above the span, without the leading `#`s
    pub section: Option<String>,
    /// The full line the span sits on
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Placeholder(Placeholder),
}

/// A parsed skeleton
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(name: impl Into<String>, text: &str) -> Self {
        let mut segments = Vec::new();
        let mut pending = String::new();
        let mut section: Option<String> = None;

        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        for (line, kind) in lines.iter().copied().zip(classify_lines(&lines)) {
            match kind {
                LineKind::Text => {}
                LineKind::Atx(heading) | LineKind::Underline(_, heading) => {
                    section = Some(heading);
                    pending.push_str(line);
                    continue;
                }
                LineKind::Code | LineKind::SetextText => {
                    pending.push_str(line);
                    continue;
                }
            }

            let mut cursor = 0;
            for caps in PLACEHOLDER.captures_iter(line) {
                let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let is_link = caps.get(2).is_some() || line[..whole.start()].ends_with('!');
                let instruction = inner.as_str().trim();
                if is_link || is_checkbox(instruction) {
                    continue;
                }
                pending.push_str(&line[cursor..whole.start()]);
                if !pending.is_empty() {
                    segments.push(Segment::Static(std::mem::take(&mut pending)));
                }
                segments.push(Segment::Placeholder(Placeholder {
                    instruction: instruction.to_string(),
                    section: section.clone(),
                    line: line.trim_end().to_string(),
                }));
                cursor = whole.end();
            }
            pending.push_str(&line[cursor..]);
        }
        if !pending.is_empty() {
            segments.push(Segment::Static(pending));
        }

        Self {
            name: name.into(),
            segments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Static(_) => None,
        })
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders().count()
    }

    /// Heading lines in document order
    pub fn headings(&self) -> Vec<String> {
        headings_of(&self.skeleton_text())
    }

    /// Splice one replacement per placeholder into the skeleton.
    ///
    /// Returns `None` unless exactly one fill is supplied per placeholder.
    pub fn fill(&self, fills: &[String]) -> Option<String> {
        if fills.len() != self.placeholder_count() {
            return None;
        }
        let mut out = String::new();
        let mut fills = fills.iter();
        for segment in &self.segments {
            match segment {
                Segment::Static(text) => out.push_str(text),
                Segment::Placeholder(_) => out.push_str(fills.next()?),
            }
        }
        Some(out)
    }

    /// The skeleton with placeholders left in place
    pub fn skeleton_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Static(text) => out.push_str(text),
                Segment::Placeholder(p) => {
                    out.push('[');
                    out.push_str(&p.instruction);
                    out.push(']');
                }
            }
        }
        out
    }
}

/// Heading lines of a markdown document in order, skipping fenced code.
///
/// ATX headings are returned as written; setext headings are normalized to
/// `# Title` / `## Title`.
pub fn headings_of(markdown: &str) -> Vec<String> {
    let lines: Vec<&str> = markdown.lines().collect();
    lines
        .iter()
        .zip(classify_lines(&lines))
        .filter_map(|(line, kind)| match kind {
            LineKind::Atx(_) => Some(line.trim().to_string()),
            LineKind::Underline(level, text) => Some(format!("{} {}", "#".repeat(level), text)),
            _ => None,
        })
        .collect()
}

/// Block role of one skeleton line
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    Text,
    /// Fence line or fenced content
    Code,
    /// `#` heading, with its text
    Atx(String),
    /// Paragraph line turned into a heading by the underline below it
    SetextText,
    /// `===` (level 1) or `---` (level 2) underline, with the heading text
    Underline(usize, String),
}

/// A small subset of CommonMark block parsing: enough to tell headings and
/// code apart from text. Containers are not parsed; a list item, quote or raw
/// HTML line only stops the lines after it from forming a setext heading.
fn classify_lines(lines: &[&str]) -> Vec<LineKind> {
    let mut kinds = vec![LineKind::Text; lines.len()];
    let mut fence: Option<(char, usize)> = None;
    let mut paragraph: Vec<usize> = Vec::new();
    let mut lazy = false;

    for (i, line) in lines.iter().enumerate() {
        if let Some((marker, len)) = fence {
            kinds[i] = LineKind::Code;
            if let Some((c, n, rest)) = fence_run(line)
                && c == marker
                && n >= len
                && rest.trim().is_empty()
            {
                fence = None;
            }
            continue;
        }
        if let Some((c, n, _)) = fence_run(line) {
            kinds[i] = LineKind::Code;
            fence = Some((c, n));
            paragraph.clear();
            continue;
        }
        if line.trim().is_empty() {
            paragraph.clear();
            lazy = false;
            continue;
        }
        if let Some(level) = setext_underline(line)
            && !paragraph.is_empty()
        {
            let text = paragraph
                .iter()
                .map(|&j| lines[j].trim())
                .collect::<Vec<_>>()
                .join(" ");
            for &j in &paragraph {
                kinds[j] = LineKind::SetextText;
            }
            kinds[i] = LineKind::Underline(level, text);
            paragraph.clear();
            continue;
        }
        if let Some(text) = heading_text(line) {
            kinds[i] = LineKind::Atx(text);
            paragraph.clear();
            lazy = false;
            continue;
        }
        match block_start(line) {
            // Four or more columns: indented code, or a paragraph continuation
            None => {
                if !paragraph.is_empty() {
                    paragraph.push(i);
                }
            }
            Some((_, body)) if is_thematic_break(body) => {
                paragraph.clear();
                lazy = false;
            }
            Some((_, body)) if opens_container(body) => {
                paragraph.clear();
                lazy = true;
            }
            Some(_) if lazy => {}
            Some(_) => paragraph.push(i),
        }
    }
    kinds
}

/// Split a line into its indent (at most three spaces) and body, without the
/// line ending. `None` when the line is indented as code.
pub(crate) fn block_start(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 || line[indent..].starts_with('\t') {
        return None;
    }
    Some(line.split_at(indent))
}

/// Fence marker, run length and info string of a ```` ``` ```` or `~~~` line
pub(crate) fn fence_run(line: &str) -> Option<(char, usize, &str)> {
    let (_, body) = block_start(line)?;
    let marker = body.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = body.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let rest = &body[len..];
    if marker == '`' && rest.contains('`') {
        return None;
    }
    Some((marker, len, rest))
}

/// Level of a setext underline: 1 for `===`, 2 for `---`
pub(crate) fn setext_underline(line: &str) -> Option<usize> {
    let (_, body) = block_start(line)?;
    let body = body.trim_end();
    let level = match body.chars().next()? {
        '=' => 1,
        '-' => 2,
        _ => return None,
    };
    let marker = if level == 1 { '=' } else { '-' };
    body.chars().all(|c| c == marker).then_some(level)
}

/// Text of an ATX heading line, `None` for anything else
pub(crate) fn heading_text(line: &str) -> Option<String> {
    let (_, trimmed) = block_start(line)?;
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some(rest.trim().to_string())
}

fn is_thematic_break(body: &str) -> bool {
    let marks: Vec<char> = body.chars().filter(|c| !c.is_whitespace()).collect();
    marks.len() >= 3
        && matches!(marks[0], '-' | '*' | '_')
        && marks.iter().all(|c| *c == marks[0])
}

fn opens_container(body: &str) -> bool {
    let spaced = |rest: &str| rest.is_empty() || rest.starts_with([' ', '\t']);
    if body.starts_with(['>', '<']) {
        return true;
    }
    if let Some(rest) = body.strip_prefix(['-', '*', '+']) {
        return spaced(rest);
    }
    let digits = body.chars().take_while(char::is_ascii_digit).count();
    (1..=9).contains(&digits)
        && body[digits..]
            .strip_prefix(['.', ')'])
            .is_some_and(spaced)
}

fn is_checkbox(instruction: &str) -> bool {
    instruction.is_empty() || instruction.eq_ignore_ascii_case("x")
}

/// Skeletons from the configured directory, with the shipped ones as fallback
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    dir: PathBuf,
}

impl TemplateLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pick the skeleton for a diagnosis: the first tier-2 label with its own
    /// template wins, otherwise the base template.
    pub fn select(&self, tier2: &[Tier2]) -> Result<Template> {
        for label in tier2 {
            let name = format!("{}_template.md", label.slug());
            if let Some(template) = self.find(&name)? {
                tracing::debug!(template = %name, tier2 = %label, "Selected template");
                return Ok(template);
            }
        }
        self.find(BASE_TEMPLATE)?.ok_or_else(|| CoachError::Template {
            message: format!("{} not found in {}", BASE_TEMPLATE, self.dir.display()),
        })
    }

    /// Load a named skeleton, `None` when neither the directory nor the
    /// built-ins have it.
    pub fn find(&self, name: &str) -> Result<Option<Template>> {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => return Ok(Some(Template::parse(name, &text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CoachError::Template {
                    message: format!("failed to read {}: {}", path.display(), e),
                });
            }
        }
        Ok(BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(builtin, text)| Template::parse(*builtin, text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKELETON: &str = "# Plan [Draft]\n\n## Gap\n\nYou tend to [describe the pattern].\n\nSee [the guide](https://example.com) and ![chart](c.png).\n\n- [ ] done\n- [x] also done\n\n## Exercises\n\n1. [Exercise 1]\n2. [Exercise 2]\n\n```\n[not a placeholder]\n```\n";

    #[test]
    fn parses_placeholders_with_sections() {
        let template = Template::parse("t.md", SKELETON);
        let found: Vec<(&str, Option<&str>)> = template
            .placeholders()
            .map(|p| (p.instruction.as_str(), p.section.as_deref()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("describe the pattern", Some("Gap")),
                ("Exercise 1", Some("Exercises")),
                ("Exercise 2", Some("Exercises")),
            ]
        );
        let first = template.placeholders().next().unwrap();
        assert_eq!(first.line, "You tend to [describe the pattern].");
    }

    #[test]
    fn skeleton_text_round_trips() {
        let template = Template::parse("t.md", SKELETON);
        assert_eq!(template.skeleton_text(), SKELETON);
    }

    #[test]
    fn fill_splices_in_order() {
        let template = Template::parse("t.md", "## A\n\nx [one] y [two]\n");
        let out = template
            .fill(&["1".to_string(), "2".to_string()])
            .unwrap();
        assert_eq!(out, "## A\n\nx 1 y 2\n");
        assert!(template.fill(&["only one".to_string()]).is_none());
    }

    #[test]
    fn headings_are_listed_in_order() {
        let template = Template::parse("t.md", SKELETON);
        assert_eq!(
            template.headings(),
            vec!["# Plan [Draft]", "## Gap", "## Exercises"]
        );
        assert!(headings_of("#hashtag\n####### seven\n").is_empty());
    }

    #[test]
    fn setext_headings_are_recognised() {
        assert_eq!(
            headings_of("Title\n=====\n\ntext\n\nSub\nparts\n---\n"),
            vec!["# Title", "## Sub parts"]
        );
        // A rule after a blank line, a list item or a quote is not an underline
        assert!(headings_of("text\n\n---\n").is_empty());
        assert!(headings_of("- item\n---\n> quoted\n===\n").is_empty());
        assert!(headings_of("    # indented code\n").is_empty());

        let template = Template::parse("t.md", "Plan\n====\n\nDo [this].\n\nReview\n------\n\n[that]\n");
        let sections: Vec<Option<&str>> =
            template.placeholders().map(|p| p.section.as_deref()).collect();
        assert_eq!(sections, vec![Some("Plan"), Some("Review")]);
        assert_eq!(template.headings(), vec!["# Plan", "## Review"]);
    }

    #[test]
    fn fences_close_only_on_the_same_marker() {
        let markdown = "# A\n~~~\n```\n# hidden\n~~~\n## B\n````\n```\n## hidden\n````\n";
        assert_eq!(headings_of(markdown), vec!["# A", "## B"]);

        let template = Template::parse("t.md", "~~~\n```\n[code]\n~~~\n[real]\n");
        let found: Vec<&str> = template.placeholders().map(|p| p.instruction.as_str()).collect();
        assert_eq!(found, vec!["real"]);
    }

    #[test]
    fn builtin_templates_parse() {
        let library = TemplateLibrary::new("no/such/dir");
        let base = library.find(BASE_TEMPLATE).unwrap().unwrap();
        assert!(base.placeholder_count() > 0);
        assert!(
            base.headings()
                .contains(&"## Understanding Your Regulation Gap".to_string())
        );
        assert!(library.find("missing_template.md").unwrap().is_none());
    }

    #[test]
    fn selects_risk_template_for_assessing_risks() {
        let library = TemplateLibrary::new("no/such/dir");
        let risk = library
            .select(&[Tier2::FormingFeasiblePlans, Tier2::AssessingRisks])
            .unwrap();
        assert_eq!(risk.name(), "assessing_risks_template.md");
        let base = library.select(&[Tier2::FearsAndAnxieties]).unwrap();
        assert_eq!(base.name(), BASE_TEMPLATE);
        let base = library.select(&[]).unwrap();
        assert_eq!(base.name(), BASE_TEMPLATE);
    }

    #[test]
    fn directory_templates_take_precedence() {
        let dir = std::env::temp_dir().join(format!("coach-templates-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(BASE_TEMPLATE), "# Custom\n\n[fill me]\n").unwrap();
        let library = TemplateLibrary::new(dir.clone());
        let template = library.select(&[]).unwrap();
        assert_eq!(template.headings(), vec!["# Custom"]);
        assert_eq!(template.placeholder_count(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
