//! Application value wiring note -> diagnosis -> similar cases -> plan.

use serde::Serialize;
use std::sync::Arc;

use crate::cases::{Case, CaseStore};
use crate::categorizer::Categorizer;
use crate::clients::{OpenAiChatClient, TextGenerator};
use crate::codebook::Codebook;
use crate::config::Config;
use crate::diagnosis::Diagnosis;
use crate::error::{CoachError, Result};
use crate::matcher::{self, ScoredCase};
use crate::note::Note;
use crate::renderer::{TemplateRenderer, output_file_name};
use crate::template::TemplateLibrary;

/// A rendered practice plan ready to be written out
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPlan {
    pub case_id: String,
    pub template: String,
    pub file_name: String,
    pub markdown: String,
}

pub struct Coach {
    cases: Arc<CaseStore>,
    templates: TemplateLibrary,
    categorizer: Categorizer,
    renderer: TemplateRenderer,
    top_k: usize,
}

impl Coach {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        cases: Arc<CaseStore>,
        codebook: Arc<Codebook>,
        templates: TemplateLibrary,
        config: &Config,
    ) -> Self {
        Self {
            cases,
            templates,
            categorizer: Categorizer::from_config(generator.clone(), codebook, &config.llm),
            renderer: TemplateRenderer::from_config(generator, &config.llm),
            top_k: config.matching.top_k,
        }
    }

    /// Load the codebook, case library and templates named by `config`.
    /// The case library must load cleanly; the model backend is injected.
    pub fn load(config: &Config, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let codebook = Arc::new(Codebook::load(&config.data.codebook_path)?);
        let cases = Arc::new(CaseStore::load(&config.data.cases_path)?);
        let templates = TemplateLibrary::new(config.data.templates_dir.clone());
        Ok(Self::new(generator, cases, codebook, templates, config))
    }

    /// Same as [`Coach::load`] with the hosted chat-completions backend
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let client =
            OpenAiChatClient::new(&config.llm, Some(api_key)).map_err(|e| CoachError::Config {
                message: e.to_string(),
            })?;
        tracing::info!(model = client.model(), base_url = %config.llm.base_url, "Model backend ready");
        Self::load(config, Arc::new(client))
    }

    pub fn cases(&self) -> &CaseStore {
        &self.cases
    }

    pub fn codebook(&self) -> &Codebook {
        self.categorizer.codebook()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn diagnose(&self, note: &Note) -> Result<Diagnosis> {
        self.categorizer.categorize(note).await
    }

    /// Ranked precedent cases for a diagnosis, limited to the configured `top_k`
    pub fn similar_cases(&self, diagnosis: &Diagnosis) -> Vec<ScoredCase<'_>> {
        matcher::rank(diagnosis, &self.cases, self.top_k)
    }

    /// Resolve the case a plan is built on: the requested id, or the top match.
    /// `Ok(None)` when no case shares a category with the diagnosis.
    pub fn choose_case(
        &self,
        diagnosis: &Diagnosis,
        case_id: Option<&str>,
    ) -> Result<Option<&Case>> {
        match case_id {
            Some(id) => self.cases.require(id).map(Some),
            None => Ok(matcher::rank(diagnosis, &self.cases, 1)
                .into_iter()
                .next()
                .map(|scored| scored.case)),
        }
    }

    /// Render the practice plan for one chosen case
    pub async fn render_plan(
        &self,
        note: &Note,
        diagnosis: &Diagnosis,
        case_id: &str,
    ) -> Result<RenderedPlan> {
        let case = self.cases.require(case_id)?;
        let template = self.templates.select(&diagnosis.tier2())?;
        let markdown = self.renderer.render(note, diagnosis, case, &template).await?;
        Ok(RenderedPlan {
            case_id: case.id.clone(),
            template: template.name().to_string(),
            file_name: output_file_name(case, &note.title),
            markdown,
        })
    }

    pub async fn application_strategies(
        &self,
        note: &Note,
        diagnosis: &Diagnosis,
        case_id: &str,
    ) -> Result<String> {
        let case = self.cases.require(case_id)?;
        self.renderer
            .application_strategies(note, diagnosis, case)
            .await
    }
}
