pub mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use visualfoundry_core::{load_foundry_config, FoundryConfig};

pub use api::{router, AppState};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] visualfoundry_core::ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] visualfoundry_core::StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid bind address {address}: {reason}")]
    InvalidBind { address: String, reason: String },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "VisualFoundry motion-graphic render server", long_about = None)]
pub struct Cli {
    /// Path to visualfoundry.toml
    #[arg(long, default_value = "configs/visualfoundry.toml")]
    pub config: PathBuf,
    /// Address to listen on (overrides server.bind_address)
    #[arg(long, env = "VISUALFOUNDRY_BIND")]
    pub bind: Option<String>,
    /// ffmpeg binary (overrides encoder.ffmpeg_path)
    #[arg(long, env = "VISUALFOUNDRY_FFMPEG")]
    pub ffmpeg: Option<String>,
    /// Directory with the web front-end (overrides server.public_dir)
    #[arg(long)]
    pub public_dir: Option<PathBuf>,
    /// Maximum concurrent encoder processes (overrides limits.max_concurrent_renders)
    #[arg(long)]
    pub max_renders: Option<usize>,
}

/// Loads the TOML config and applies command-line overrides. The result is
/// immutable for the life of the process.
pub fn load_config(cli: &Cli) -> Result<FoundryConfig> {
    let mut config = load_foundry_config(&cli.config)?;
    if let Some(bind) = &cli.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(ffmpeg) = &cli.ffmpeg {
        config.encoder.ffmpeg_path = ffmpeg.clone();
    }
    if let Some(public_dir) = &cli.public_dir {
        config.server.public_dir = public_dir.to_string_lossy().to_string();
    }
    if let Some(max_renders) = cli.max_renders {
        config.limits.max_concurrent_renders = max_renders;
    }
    config.validate()?;
    Ok(config)
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing();
    let config = Arc::new(load_config(&cli)?);
    let address: SocketAddr =
        config
            .server
            .bind_address
            .parse()
            .map_err(|error: std::net::AddrParseError| AppError::InvalidBind {
                address: config.server.bind_address.clone(),
                reason: error.to_string(),
            })?;

    let state = AppState::from_config(Arc::clone(&config)).await?;
    let app = router(state);
    let listener = TcpListener::bind(address).await?;
    info!(
        %address,
        ffmpeg = %config.encoder.ffmpeg_path,
        render_permits = config.limits.render_permits(),
        "VisualFoundry listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn cli() -> Cli {
        Cli {
            config: Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/visualfoundry.toml"),
            bind: None,
            ffmpeg: None,
            public_dir: None,
            max_renders: None,
        }
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cli = cli();
        cli.bind = Some("127.0.0.1:9000".into());
        cli.ffmpeg = Some("/usr/local/bin/ffmpeg".into());
        cli.max_renders = Some(2);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.encoder.ffmpeg_path, "/usr/local/bin/ffmpeg");
        assert_eq!(config.limits.render_permits(), 2);
    }

    #[test]
    fn file_values_apply_without_overrides() {
        let config = load_config(&cli()).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert_eq!(config.encoder.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from(["visualfoundry", "--config", "x.toml", "--max-renders", "4"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert_eq!(cli.max_renders, Some(4));
    }
}
