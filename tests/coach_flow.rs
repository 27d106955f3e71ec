//! End-to-end flow over the shipped data with a scripted model backend

use std::path::PathBuf;
use std::sync::Arc;

use regulation_coach::clients::ScriptedGenerator;
use regulation_coach::codebook::Codebook;
use regulation_coach::config::Config;
use regulation_coach::template::{TemplateLibrary, headings_of};
use regulation_coach::{CaseStore, Coach, CoachError, Diagnosis, Note, Tier1, Tier2};

const RISK_ANSWER: &str = "Reasoning: The student polishes mockups while the audience is unknown, so the biggest unknown is left unaddressed.\nTier 1 Categories: Cognitive (high)\nTier 2 Categories: Assessing risks (high)";

fn data_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
}

fn coach(generator: Arc<ScriptedGenerator>) -> Coach {
    let mut config = Config::default();
    config.llm.retry_delay_ms = 0;
    let cases = CaseStore::load(&data_path("data/tiered_weighted_cases.json")).unwrap();
    let codebook = Codebook::load(&data_path("data/codebook.txt")).unwrap();
    Coach::new(
        generator,
        Arc::new(cases),
        Arc::new(codebook),
        TemplateLibrary::new(data_path("templates")),
        &config,
    )
}

fn mockup_note() -> Note {
    Note::from_sections(
        "note-1",
        "Designing before discovery",
        "Spends every session building detailed, polished mockups while the target audience is still unidentified.",
        "No interviews have been scheduled.",
        "[self-work] List the riskiest assumptions first.",
    )
}

#[tokio::test]
async fn mockup_note_surfaces_john_case() {
    let generator = Arc::new(ScriptedGenerator::with_replies([RISK_ANSWER]));
    let coach = coach(generator.clone());

    let diagnosis = coach.diagnose(&mockup_note()).await.unwrap();
    assert!(
        diagnosis
            .gaps
            .iter()
            .any(|g| g.tier1 == Tier1::Cognitive && g.tier2 == Some(Tier2::AssessingRisks))
    );
    assert_eq!(diagnosis.codebook_checksum, coach.codebook().checksum());

    let similar = coach.similar_cases(&diagnosis);
    let john = similar
        .iter()
        .find(|s| s.case.project.as_deref() == Some("John"))
        .expect("John case in ranking");
    assert!(john.score > 0.0);
    assert!(similar.len() <= coach.top_k());

    let prompt = &generator.requests()[0].prompt;
    assert!(prompt.contains("polished mockups"));
    assert!(prompt.contains("Assessing risks"));
}

#[tokio::test]
async fn blank_note_is_a_classification_failure() {
    let generator = Arc::new(ScriptedGenerator::new().with_fallback(RISK_ANSWER));
    let coach = coach(generator.clone());

    let err = coach
        .diagnose(&Note::new("blank", "", "  \n ", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::ClassificationFailure { .. }));
    assert!(err.to_string().contains("please add more detail to your note"));
    assert_eq!(generator.request_count(), 0);
}

#[tokio::test]
async fn no_overlap_is_an_empty_ranking() {
    let store = CaseStore::from_json_str(
        r#"[{"id": "only", "gap_text": "Avoids user tests", "tier1_categories": "Emotional",
             "tier2_categories": "Fears and anxieties", "weights": {"Fears and anxieties": 2}}]"#,
    )
    .unwrap();
    let generator = Arc::new(ScriptedGenerator::with_replies([RISK_ANSWER]));
    let coach = Coach::new(
        generator,
        Arc::new(store),
        Arc::new(Codebook::builtin()),
        TemplateLibrary::new(data_path("templates")),
        &Config::default(),
    );

    let diagnosis = coach.diagnose(&mockup_note()).await.unwrap();
    assert!(coach.similar_cases(&diagnosis).is_empty());
    assert!(matches!(coach.choose_case(&diagnosis, None), Ok(None)));
    let requested = coach.choose_case(&diagnosis, Some("only")).unwrap();
    assert_eq!(requested.map(|c| c.id.as_str()), Some("only"));
    assert!(matches!(
        coach.choose_case(&diagnosis, Some("missing")),
        Err(CoachError::CaseNotFound { .. })
    ));
}

#[tokio::test]
async fn ranking_is_reproducible() {
    let generator = Arc::new(ScriptedGenerator::new().with_fallback(RISK_ANSWER));
    let coach = coach(generator);

    let first = coach.diagnose(&mockup_note()).await.unwrap();
    let second = coach.diagnose(&mockup_note()).await.unwrap();
    let ids = |d: &Diagnosis| {
        coach
            .similar_cases(d)
            .iter()
            .map(|s| (s.case.id.clone(), s.score))
            .collect::<Vec<_>>()
    };
    let a = ids(&first);
    assert_eq!(a, ids(&second));
    // "01" and "03" both score 4.0; the lower id comes first
    assert_eq!(a[0], ("01".to_string(), 4.0));
    assert_eq!(a[1], ("03".to_string(), 4.0));
}

#[tokio::test]
async fn invalid_labels_are_never_accepted() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_fallback("Tier 1 Categories: Cognitive\nTier 2 Categories: Time management"),
    );
    let coach = coach(generator.clone());

    let err = coach.diagnose(&mockup_note()).await.unwrap_err();
    match err {
        CoachError::InvalidCategory { labels, .. } => {
            assert_eq!(labels, vec!["Time management".to_string()]);
        }
        other => panic!("expected InvalidCategory, got {:?}", other),
    }
    assert_eq!(generator.request_count(), 3);
}

#[tokio::test]
async fn rendered_plan_keeps_template_headings() {
    let generator = Arc::new(ScriptedGenerator::with_replies([RISK_ANSWER]));
    let coach = coach(generator.clone());
    let note = mockup_note();
    let diagnosis = coach.diagnose(&note).await.unwrap();

    let risk_template = TemplateLibrary::new(data_path("templates"))
        .select(&[Tier2::AssessingRisks])
        .unwrap();
    for i in 0..risk_template.placeholder_count() {
        generator.push_reply(format!("## Generated {}\nfilled text {}", i, i));
    }

    let plan = coach.render_plan(&note, &diagnosis, "03").await.unwrap();
    assert_eq!(plan.template, "assessing_risks_template.md");
    assert_eq!(plan.file_name, "practice_template_John.md");
    assert_eq!(headings_of(&plan.markdown), risk_template.headings());
    assert!(plan.markdown.contains("## How This Relates to a Similar Case"));
    assert!(plan.markdown.contains("filled text 0"));
    assert!(!plan.markdown.contains("[LLM will"));
    assert_eq!(
        generator.request_count(),
        1 + risk_template.placeholder_count()
    );
}

#[tokio::test]
async fn render_failure_returns_no_document() {
    let generator = Arc::new(ScriptedGenerator::with_replies([RISK_ANSWER, "first fill"]));
    let coach = coach(generator);
    let note = mockup_note();
    let diagnosis = coach.diagnose(&note).await.unwrap();

    // The script runs out after one fill
    let err = coach.render_plan(&note, &diagnosis, "01").await.unwrap_err();
    assert!(matches!(err, CoachError::RenderingFailure { .. }));
    assert!(err.to_string().contains("Unable to generate template, try again"));
}

#[tokio::test]
async fn unknown_case_id_is_reported() {
    let generator = Arc::new(ScriptedGenerator::with_replies([RISK_ANSWER]));
    let coach = coach(generator);
    let note = mockup_note();
    let diagnosis = coach.diagnose(&note).await.unwrap();
    let err = coach.render_plan(&note, &diagnosis, "99").await.unwrap_err();
    assert!(matches!(err, CoachError::CaseNotFound { case_id } if case_id == "99"));
}
