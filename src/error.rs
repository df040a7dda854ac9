use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("path does not match the QA directory hierarchy: {path}")]
    PathGrammarMismatch { path: String },

    #[error("failed to load layer `{layer}` from {}: {reason}", path.display())]
    Load {
        path: PathBuf,
        layer: String,
        reason: String,
    },

    #[error("option `{option}` is required for path {}", path.display())]
    Configuration { option: &'static str, path: PathBuf },
}

impl QaError {
    pub fn load(path: impl Into<PathBuf>, layer: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            layer: layer.into(),
            reason: reason.to_string(),
        }
    }
}

pub type QaResult<T> = Result<T, QaError>;
