use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FoundryConfig {
    pub server: ServerSection,
    pub paths: PathsSection,
    pub encoder: EncoderSection,
    pub render: RenderSection,
    pub limits: LimitsSection,
}

impl FoundryConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.uploads_dir)
    }

    pub fn renders_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.renders_dir)
    }

    pub fn public_dir(&self) -> PathBuf {
        self.resolve_path(&self.server.public_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.render.fps == 0 {
            return Err(ConfigError::Invalid {
                field: "render.fps",
                reason: "must be greater than zero".into(),
            });
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::Invalid {
                field: "render.width/render.height",
                reason: "canvas dimensions must be non-zero".into(),
            });
        }
        if self.render.max_text_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "render.max_text_chars",
                reason: "must allow at least one character".into(),
            });
        }
        if self.encoder.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "encoder.timeout_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub bind_address: String,
    pub public_dir: String,
    pub upload_limit_mb: u64,
}

impl ServerSection {
    pub fn upload_limit_bytes(&self) -> usize {
        (self.upload_limit_mb as usize).saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub uploads_dir: String,
    pub renders_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSection {
    pub ffmpeg_path: String,
    pub log_level: String,
    pub video_codec: String,
    pub preset: String,
    pub pix_fmt: String,
    pub timeout_seconds: u64,
}

impl EncoderSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderSection {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub band_height: u32,
    pub max_text_chars: usize,
    pub title_font: String,
    pub tagline_font: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSection {
    pub max_concurrent_renders: usize,
}

impl LimitsSection {
    /// Number of encoder processes allowed to run at once. Zero means one per core.
    pub fn render_permits(&self) -> usize {
        if self.max_concurrent_renders > 0 {
            return self.max_concurrent_renders;
        }
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

pub fn load_foundry_config<P: AsRef<Path>>(path: P) -> Result<FoundryConfig> {
    let config: FoundryConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/visualfoundry.toml")
    }

    #[test]
    fn load_fixture_config() {
        let config = load_foundry_config(fixture()).expect("config should parse");
        assert_eq!(config.server.upload_limit_mb, 20);
        assert_eq!(config.encoder.preset, "veryfast");
        assert_eq!(config.render.fps, 30);
        assert_eq!(config.render.width, 1920);
        assert!(config.limits.render_permits() >= 1);
    }

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        let mut config = load_foundry_config(fixture()).unwrap();
        config.paths.base_dir = "/srv/foundry".into();
        assert_eq!(config.uploads_dir(), PathBuf::from("/srv/foundry/uploads"));
        config.paths.renders_dir = "/tmp/renders".into();
        assert_eq!(config.renders_dir(), PathBuf::from("/tmp/renders"));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut config = load_foundry_config(fixture()).unwrap();
        config.render.fps = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "render.fps",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_foundry_config("/nonexistent/visualfoundry.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/visualfoundry.toml"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_render_limit_wins() {
        let limits = LimitsSection {
            max_concurrent_renders: 3,
        };
        assert_eq!(limits.render_permits(), 3);
    }
}
