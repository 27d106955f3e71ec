//! regulation-coach: diagnose a coaching note, find similar cases, render a practice plan.
//!
//! Usage:
//!   regulation-coach taxonomy
//!   regulation-coach cases
//!   regulation-coach diagnose --title "..." --gap "..." [--context "..."] [--plan "..."] [--json]
//!   regulation-coach render --note-file note.json [--case-id 03] [--out plans/] [--strategies]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use regulation_coach::config::Config;
use regulation_coach::{CaseStore, Coach, Note, taxonomy};

#[derive(Parser)]
#[command(name = "regulation-coach")]
#[command(about = "Regulation-gap diagnosis and practice plans for coaching notes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the regulation-gap taxonomy
    Taxonomy,
    /// Validate and list the case library
    Cases,
    /// Categorize a note and list the most similar cases
    Diagnose {
        #[command(flatten)]
        note: NoteArgs,
        /// Emit the diagnosis and ranking as JSON
        #[arg(long)]
        json: bool,
        /// Number of similar cases to show (0 for all); overrides the config
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Diagnose a note and render a practice plan from a similar case
    Render {
        #[command(flatten)]
        note: NoteArgs,
        /// Case to build the plan on; defaults to the best match
        #[arg(long)]
        case_id: Option<String>,
        /// Output file, or a directory to write practice_template_<project>.md into
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also generate "How This Applies To You" strategies
        #[arg(long)]
        strategies: bool,
    },
}

#[derive(Args)]
struct NoteArgs {
    /// JSON note file: { "id", "title", "gap_text", "other_content" }
    #[arg(long, conflicts_with_all = ["title", "gap", "context", "plan"])]
    note_file: Option<PathBuf>,
    #[arg(long, default_value = "")]
    title: String,
    /// The assessed regulation gap
    #[arg(long, default_value = "")]
    gap: String,
    #[arg(long, default_value = "")]
    context: String,
    #[arg(long, default_value = "")]
    plan: String,
}

impl NoteArgs {
    fn into_note(self) -> Result<Note> {
        let mut note = match self.note_file {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read note file {}", path.display()))?;
                serde_json::from_str::<Note>(&raw)
                    .with_context(|| format!("invalid note file {}", path.display()))?
            }
            None => Note::from_sections("", self.title, self.gap, &self.context, &self.plan),
        };
        if note.id.trim().is_empty() {
            note.id = "cli".to_string();
        }
        Ok(note)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the document or JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("regulation_coach=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Taxonomy => {
            print!("{}", taxonomy::outline());
            Ok(())
        }
        Commands::Cases => list_cases(),
        Commands::Diagnose { note, json, top_k } => diagnose(note.into_note()?, json, top_k).await,
        Commands::Render {
            note,
            case_id,
            out,
            strategies,
        } => render(note.into_note()?, case_id, out, strategies).await,
    }
}

fn list_cases() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let store = CaseStore::load(&config.data.cases_path)
        .with_context(|| format!("failed to load {}", config.data.cases_path.display()))?;
    println!(
        "{} case(s) in {}",
        store.len(),
        config.data.cases_path.display()
    );
    for case in store.iter() {
        println!(
            "[{}] {} | Tier 1: {} | Tier 2: {} | total weight {:.2}",
            case.id,
            case.project_name(),
            case.tier1_line(),
            case.tier2_line(),
            case.total_weight()
        );
    }
    Ok(())
}

async fn diagnose(note: Note, as_json: bool, top_k: Option<usize>) -> Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(top_k) = top_k {
        config.matching.top_k = top_k;
    }
    let coach = Coach::from_config(&config)?;

    let diagnosis = coach.diagnose(&note).await?;
    let similar = coach.similar_cases(&diagnosis);

    if as_json {
        let out = json!({
            "diagnosis": diagnosis,
            "similar_cases": similar,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Tier 1 Categories: {}", diagnosis.tier1_line());
    println!("Tier 2 Categories: {}", diagnosis.tier2_line());
    println!(
        "Reasoning: {}",
        diagnosis.reasoning.as_deref().unwrap_or("N/A")
    );
    println!();
    if similar.is_empty() {
        println!("No similar cases share a category with this diagnosis.");
        return Ok(());
    }
    println!("Similar Cases");
    for (i, scored) in similar.iter().enumerate() {
        let matched = scored
            .matched
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{}. [{}] {} (score {:.2}, coverage {:.0}%)",
            i + 1,
            scored.case.id,
            scored.case.project_name(),
            scored.score,
            scored.coverage * 100.0
        );
        println!("   Matched: {}", matched);
        println!("   Gap: {}", scored.case.gap_text.trim());
    }
    Ok(())
}

async fn render(
    note: Note,
    case_id: Option<String>,
    out: Option<PathBuf>,
    strategies: bool,
) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let coach = Coach::from_config(&config)?;

    let diagnosis = coach.diagnose(&note).await?;
    let Some(case) = coach.choose_case(&diagnosis, case_id.as_deref())? else {
        println!("No similar case found for this diagnosis; no plan was rendered.");
        return Ok(());
    };
    let case_id = case.id.clone();
    tracing::info!(case = %case_id, "Rendering practice plan");

    let plan = coach.render_plan(&note, &diagnosis, &case_id).await?;
    let strategies = if strategies {
        Some(
            coach
                .application_strategies(&note, &diagnosis, &case_id)
                .await?,
        )
    } else {
        None
    };

    match out {
        Some(target) => {
            let path = output_path(&target, &plan.file_name);
            std::fs::write(&path, &plan.markdown)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {} (case {}, {})", path.display(), plan.case_id, plan.template);
            if let Some(text) = strategies {
                println!("\nHow This Applies To You\n\n{}", text);
            }
        }
        None => {
            print!("{}", plan.markdown);
            if let Some(text) = strategies {
                eprintln!("\nHow This Applies To You\n\n{}", text);
            }
        }
    }
    Ok(())
}

fn output_path(target: &Path, file_name: &str) -> PathBuf {
    if target.is_dir() {
        target.join(file_name)
    } else {
        target.to_path_buf()
    }
}
