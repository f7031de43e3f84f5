use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch encoder {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("encoder exited with status {status:?}: {stderr}")]
    Encode { status: Option<i32>, stderr: String },
    #[error("encoder did not finish within {seconds}s")]
    Timeout { seconds: u64 },
    #[error("render pool is shut down")]
    Unavailable,
}

impl RenderError {
    /// Diagnostic suitable for an API error body.
    pub fn details(&self) -> String {
        match self {
            RenderError::Encode { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
