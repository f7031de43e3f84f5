use std::path::{Path, PathBuf};

use chrono::Utc;
use image::ImageFormat;
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::config::FoundryConfig;

const UPLOAD_SUFFIX_LEN: usize = 6;
const RENDER_SUFFIX_LEN: usize = 10;
const DEFAULT_UPLOAD_EXTENSION: &str = "png";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Directory layout for uploaded images and rendered videos.
#[derive(Debug, Clone)]
pub struct Storage {
    uploads_dir: PathBuf,
    renders_dir: PathBuf,
}

impl Storage {
    pub fn new(uploads_dir: PathBuf, renders_dir: PathBuf) -> Self {
        Self {
            uploads_dir,
            renders_dir,
        }
    }

    pub fn from_config(config: &FoundryConfig) -> Self {
        Self::new(config.uploads_dir(), config.renders_dir())
    }

    pub async fn ensure_directories(&self) -> StorageResult<()> {
        for dir in [&self.uploads_dir, &self.renders_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::Io {
                    source,
                    path: dir.clone(),
                })?;
            debug!(path = %dir.display(), "storage directory ready");
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn renders_dir(&self) -> &Path {
        &self.renders_dir
    }

    /// Fresh path for an upload. The extension follows the sniffed format, never
    /// the client-supplied file name.
    pub fn upload_path(&self, format: ImageFormat) -> PathBuf {
        let extension = format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or(DEFAULT_UPLOAD_EXTENSION);
        self.uploads_dir
            .join(unique_name(UPLOAD_SUFFIX_LEN, extension))
    }

    pub fn render_path(&self) -> PathBuf {
        self.renders_dir.join(unique_name(RENDER_SUFFIX_LEN, "mp4"))
    }
}

/// `<unix millis>-<random alphanumeric suffix>.<extension>`
pub fn unique_name(suffix_len: usize, extension: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(suffix_len)
        .map(char::from)
        .collect();
    format!("{}-{}.{}", Utc::now().timestamp_millis(), suffix, extension)
}
