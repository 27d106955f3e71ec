pub mod cases;
pub mod categorizer;
pub mod clients;
pub mod coach;
pub mod codebook;
pub mod config;
pub mod deserializers;
pub mod diagnosis;
pub mod error;
pub mod matcher;
pub mod note;
pub mod prompts;
pub mod renderer;
pub mod taxonomy;
pub mod template;

pub use cases::{Case, CaseStore};
pub use coach::{Coach, RenderedPlan};
pub use diagnosis::{Confidence, DiagnosedGap, Diagnosis};
pub use error::{CoachError, Result};
pub use note::Note;
pub use taxonomy::{Category, Tier1, Tier2};
