//! Domain-specific error types for regulation-coach

use thiserror::Error;

/// Main error type for the regulation-coach library
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Case store error: case '{case_id}': {message}")]
    CaseStore { case_id: String, message: String },

    #[error("Case not found: {case_id}")]
    CaseNotFound { case_id: String },

    #[error("Template error: {message}")]
    Template { message: String },

    /// The language model could not be reached, or every attempt failed in transport.
    #[error(
        "Categorization unavailable after {attempts} attempt(s): {message}. Please try again in a moment."
    )]
    CategorizationUnavailable { attempts: u32, message: String },

    /// The language model kept answering with labels outside the taxonomy.
    #[error("Invalid category label(s) after {attempts} attempt(s): {}", .labels.join(", "))]
    InvalidCategory { attempts: u32, labels: Vec<String> },

    #[error("Unable to diagnose, please add more detail to your note ({message})")]
    ClassificationFailure { message: String },

    #[error("Unable to generate template, try again ({message})")]
    RenderingFailure { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CoachError {
    pub(crate) fn case_store(case_id: impl Into<String>, message: impl Into<String>) -> Self {
        CoachError::CaseStore {
            case_id: case_id.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CoachError {
    fn from(err: std::io::Error) -> Self {
        CoachError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoachError {
    fn from(err: serde_json::Error) -> Self {
        CoachError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CoachError {
    fn from(err: toml::de::Error) -> Self {
        CoachError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for regulation-coach operations
pub type Result<T> = std::result::Result<T, CoachError>;
