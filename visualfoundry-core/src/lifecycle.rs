//! Ownership of the temporary files behind one render request.
//!
//! Each tracked path is removed exactly once: either by an explicit
//! [`RenderArtifacts::cleanup`] or, if the owner is dropped first (client
//! disconnect, cancelled future), by the `Drop` implementation. Removal failures
//! are logged and swallowed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RenderArtifacts {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl RenderArtifacts {
    pub fn new(input: PathBuf) -> Self {
        Self {
            input: Some(input),
            output: None,
        }
    }

    pub fn track_output(&mut self, output: PathBuf) {
        self.output = Some(output);
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub async fn cleanup(mut self) {
        for path in self.take_paths() {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "removed render artifact"),
                Err(error) => log_removal_failure(&path, &error),
            }
        }
    }

    fn take_paths(&mut self) -> Vec<PathBuf> {
        self.input.take().into_iter().chain(self.output.take()).collect()
    }
}

impl Drop for RenderArtifacts {
    fn drop(&mut self) {
        for path in self.take_paths() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed abandoned render artifact"),
                Err(error) => log_removal_failure(&path, &error),
            }
        }
    }
}

fn log_removal_failure(path: &Path, error: &std::io::Error) {
    if error.kind() == ErrorKind::NotFound {
        return;
    }
    debug!(path = %path.display(), %error, "failed to remove render artifact");
}
