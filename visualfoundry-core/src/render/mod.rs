mod error;
mod types;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Instant;

use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::FoundryConfig;
use crate::graph::GraphBuilder;
use crate::request::RenderRequest;
use crate::storage::Storage;

pub use error::{RenderError, RenderResult};
pub use types::{JobOutcome, RenderJob};

const STDERR_TAIL_LINES: usize = 12;

#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        command.output().await
    }
}

/// Drives ffmpeg for validated requests. Shared by all request handlers; the
/// semaphore bounds how many encoders run at once.
#[derive(Clone)]
pub struct Renderer {
    config: Arc<FoundryConfig>,
    builder: GraphBuilder,
    storage: Storage,
    executor: Arc<dyn CommandExecutor>,
    permits: Arc<Semaphore>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("ffmpeg", &self.config.encoder.ffmpeg_path)
            .field("storage", &self.storage)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl Renderer {
    pub fn new(config: Arc<FoundryConfig>, storage: Storage) -> Self {
        let builder = GraphBuilder::new(config.render.clone(), config.encoder.pix_fmt.clone());
        let permits = Arc::new(Semaphore::new(config.limits.render_permits()));
        Self {
            config,
            builder,
            storage,
            executor: Arc::new(SystemCommandExecutor),
            permits,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &FoundryConfig {
        &self.config
    }

    /// Builds the filter graph and reserves a unique output path.
    pub fn prepare(&self, request: &RenderRequest) -> RenderJob {
        let graph = self.builder.build(request);
        RenderJob::new(
            request.input_path().to_path_buf(),
            self.storage.render_path(),
            graph,
            request.duration_seconds(),
            request.motion(),
        )
    }

    /// Runs the encoder for `job` and returns the finished artifact. Dropping the
    /// returned future kills the encoder.
    pub async fn execute(&self, job: &mut RenderJob) -> RenderResult<PathBuf> {
        let result = self.run_encoder(job).await;
        match &result {
            Ok(_) => job.record(JobOutcome::Succeeded),
            Err(error) => job.record(JobOutcome::Failed(error.details())),
        }
        result
    }

    async fn run_encoder(&self, job: &RenderJob) -> RenderResult<PathBuf> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RenderError::Unavailable)?;

        let program = PathBuf::from(&self.config.encoder.ffmpeg_path);
        let args = self.encoder_args(job);
        debug!(job_id = %job.id, args = ?args, "launching encoder");

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let started = Instant::now();
        let limit = self.config.encoder.timeout();
        let output = match timeout(limit, self.executor.run(&mut command)).await {
            Ok(result) => result.map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(job_id = %job.id, seconds = limit.as_secs(), "encoder timed out");
                return Err(RenderError::Timeout {
                    seconds: limit.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            warn!(
                job_id = %job.id,
                status = ?output.status.code(),
                %stderr,
                "encoder failed"
            );
            return Err(RenderError::Encode {
                status: output.status.code(),
                stderr,
            });
        }

        info!(
            job_id = %job.id,
            motion = %job.motion,
            duration_s = job.duration_seconds,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "render completed"
        );
        Ok(job.output_path.clone())
    }

    pub fn encoder_args(&self, job: &RenderJob) -> Vec<String> {
        let encoder = &self.config.encoder;
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            encoder.log_level.clone(),
            "-y".to_string(),
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            path_arg(&job.input_path),
            "-filter_complex".to_string(),
            job.graph.to_filter_complex(),
            "-map".to_string(),
            format!("[{}]", job.graph.output_pad),
            "-t".to_string(),
            job.duration_seconds.to_string(),
            "-c:v".to_string(),
            encoder.video_codec.clone(),
            "-preset".to_string(),
            encoder.preset.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-pix_fmt".to_string(),
            encoder.pix_fmt.clone(),
            path_arg(&job.output_path),
        ]
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::path::Path;
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::config::load_foundry_config;
    use crate::request::RawRenderFields;

    type RecordedCalls = Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>;

    struct RecordingExecutor {
        calls: RecordedCalls,
        exit_code: i32,
        stderr: &'static str,
    }

    impl RecordingExecutor {
        fn build(exit_code: i32, stderr: &'static str) -> (Arc<dyn CommandExecutor>, RecordedCalls) {
            let calls: RecordedCalls = Arc::new(Mutex::new(Vec::new()));
            let executor: Arc<dyn CommandExecutor> = Arc::new(Self {
                calls: Arc::clone(&calls),
                exit_code,
                stderr,
            });
            (executor, calls)
        }
    }

    #[async_trait::async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
            let inner = command.as_std();
            let program = PathBuf::from(inner.get_program());
            let args: Vec<String> = inner
                .get_args()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect();
            if self.exit_code == 0 {
                if let Some(output) = args.last() {
                    std::fs::write(output, b"\x00\x00\x00\x18ftypmp42")?;
                }
            }
            self.calls.lock().unwrap().push((program, args));
            Ok(Output {
                status: std::process::ExitStatus::from_raw(self.exit_code << 8),
                stdout: Vec::new(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    struct StalledExecutor;

    #[async_trait::async_trait]
    impl CommandExecutor for StalledExecutor {
        async fn run(&self, _command: &mut Command) -> std::io::Result<Output> {
            std::future::pending().await
        }
    }

    fn renderer(temp: &TempDir) -> Renderer {
        let mut config =
            load_foundry_config(Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/visualfoundry.toml"))
                .unwrap();
        config.paths.base_dir = temp.path().to_string_lossy().to_string();
        config.encoder.ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg".into();
        config.encoder.timeout_seconds = 5;
        let config = Arc::new(config);
        let storage = Storage::from_config(&config);
        Renderer::new(config, storage)
    }

    fn request(input: PathBuf) -> RenderRequest {
        let raw = RawRenderFields {
            title: Some("Launch Day".into()),
            tagline: Some("v2".into()),
            accent_color: Some("#ff00aa".into()),
            duration: Some("10".into()),
            motion: Some("pan".into()),
        };
        RenderRequest::from_raw(input, &raw, 80)
    }

    #[tokio::test]
    async fn execute_passes_graph_and_output_options() {
        let temp = TempDir::new().unwrap();
        let (executor, calls) = RecordingExecutor::build(0, "");
        let renderer = renderer(&temp).with_executor(executor);
        renderer.storage().ensure_directories().await.unwrap();

        let mut job = renderer.prepare(&request(temp.path().join("uploads/in.png")));
        let output = renderer.execute(&mut job).await.unwrap();
        assert_eq!(output, job.output_path);
        assert!(output.exists());
        assert_eq!(job.outcome(), Some(&JobOutcome::Succeeded));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (program, args) = &calls[0];
        assert_eq!(program, &PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        let position = |flag: &str| args.iter().position(|arg| arg == flag).unwrap();
        assert_eq!(args[position("-loop") + 1], "1");
        assert_eq!(args[position("-t") + 1], "10");
        assert_eq!(args[position("-preset") + 1], "veryfast");
        assert_eq!(args[position("-movflags") + 1], "+faststart");
        assert_eq!(args[position("-pix_fmt") + 1], "yuv420p");
        assert_eq!(args[position("-map") + 1], "[out]");
        assert_eq!(args[position("-filter_complex") + 1], job.graph.to_filter_complex());
        assert!(position("-loop") < position("-i"));
    }

    #[tokio::test]
    async fn encoder_failure_carries_diagnostics() {
        let temp = TempDir::new().unwrap();
        let (executor, _calls) =
            RecordingExecutor::build(1, "Input #0\n\nin.png: Invalid data found when processing input\n");
        let renderer = renderer(&temp).with_executor(executor);

        let mut job = renderer.prepare(&request(temp.path().join("in.png")));
        let error = renderer.execute(&mut job).await.unwrap_err();
        match &error {
            RenderError::Encode { status, stderr } => {
                assert_eq!(*status, Some(1));
                assert!(stderr.ends_with("Invalid data found when processing input"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(job.outcome(), Some(JobOutcome::Failed(_))));
        assert!(!job.output_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_encoder_times_out() {
        let temp = TempDir::new().unwrap();
        let renderer = renderer(&temp).with_executor(Arc::new(StalledExecutor));
        let mut job = renderer.prepare(&request(temp.path().join("in.png")));
        let error = renderer.execute(&mut job).await.unwrap_err();
        assert!(matches!(error, RenderError::Timeout { seconds: 5 }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let temp = TempDir::new().unwrap();
        let renderer = renderer(&temp);
        let mut job = renderer.prepare(&request(temp.path().join("in.png")));
        let error = renderer.execute(&mut job).await.unwrap_err();
        assert!(matches!(error, RenderError::Spawn { .. }));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let noisy: String = (0..40).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(noisy.as_bytes());
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 39"));
    }
}
