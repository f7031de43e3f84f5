pub mod config;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod params;
pub mod render;
pub mod request;
pub mod sanitize;
pub mod storage;
pub mod upload;

pub use config::{load_foundry_config, FoundryConfig};
pub use error::{ConfigError, Result};
pub use graph::{FilterGraph, FilterKind, FilterStage, GraphBuilder, GraphError};
pub use lifecycle::RenderArtifacts;
pub use params::{frame_count, resolve_duration, MotionExpression, MotionProfile};
pub use render::{
    CommandExecutor, JobOutcome, RenderError, RenderJob, RenderResult, Renderer,
    SystemCommandExecutor,
};
pub use request::{RawRenderFields, RenderRequest};
pub use sanitize::{sanitize_color, sanitize_text, sanitize_text_bounded};
pub use storage::{Storage, StorageError};
pub use upload::{accept_image, UploadError};
