//! Regulation-gap codebook used to build the classification prompt.
//!
//! Editing the codebook file changes classification behavior without a code
//! change, so every diagnosis records the checksum of the text it was
//! produced against.

use std::path::{Path, PathBuf};

use crate::error::Result;

const BUILTIN_CODEBOOK: &str = include_str!("../data/codebook.txt");

#[derive(Debug, Clone)]
pub struct Codebook {
    text: String,
    checksum: String,
    source: Option<PathBuf>,
}

impl Codebook {
    pub fn new(text: impl Into<String>, source: Option<PathBuf>) -> Self {
        let text = text.into();
        let checksum = sha1_checksum(&text);
        Self {
            text,
            checksum,
            source,
        }
    }

    /// The codebook shipped with the crate
    pub fn builtin() -> Self {
        Self::new(BUILTIN_CODEBOOK, None)
    }

    /// Load the configured codebook, trying the usual locations relative to
    /// the working directory before falling back to the built-in text.
    pub fn load(configured: &Path) -> Result<Self> {
        for path in candidate_paths(configured) {
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    let codebook = Self::new(text, Some(path));
                    tracing::info!(
                        path = %codebook.source_label(),
                        checksum = %codebook.checksum,
                        "Codebook loaded"
                    );
                    return Ok(codebook);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        tracing::warn!(
            "Codebook {} not found, using built-in codebook",
            configured.display()
        );
        Ok(Self::builtin())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn source_label(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<built-in>".to_string())
    }
}

fn candidate_paths(configured: &Path) -> Vec<PathBuf> {
    let mut paths = vec![configured.to_path_buf()];
    if configured.is_relative() {
        paths.push(Path::new("..").join(configured));
    }
    paths
}

/// Generate a SHA1 checksum of codebook content
fn sha1_checksum(content: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
