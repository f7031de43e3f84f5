mod error;
mod stream;

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use visualfoundry_core::{
    accept_image, FoundryConfig, RawRenderFields, RenderArtifacts, RenderRequest, Renderer,
    Storage, StorageError,
};

pub use error::{ApiError, ErrorBody, FILE_TOO_LARGE, IMAGE_REQUIRED};
pub use stream::CleanupStream;

pub const DOWNLOAD_FILENAME: &str = "visualfoundry.mp4";

/// Room for multipart boundaries and the text fields on top of the image cap.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<FoundryConfig>,
    renderer: Renderer,
    started: Instant,
}

impl AppState {
    pub fn new(config: Arc<FoundryConfig>, renderer: Renderer) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                renderer,
                started: Instant::now(),
            }),
        }
    }

    /// Creates the storage directories and a renderer backed by the real encoder.
    pub async fn from_config(config: Arc<FoundryConfig>) -> Result<Self, StorageError> {
        let storage = Storage::from_config(&config);
        storage.ensure_directories().await?;
        let renderer = Renderer::new(Arc::clone(&config), storage);
        Ok(Self::new(config, renderer))
    }

    pub fn config(&self) -> &FoundryConfig {
        &self.inner.config
    }

    pub fn renderer(&self) -> &Renderer {
        &self.inner.renderer
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.inner.started.elapsed().as_secs_f64()
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config()
        .server
        .upload_limit_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let public_dir = state.config().public_dir();

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/render",
            post(render).layer(DefaultBodyLimit::max(body_limit)),
        )
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: f64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.uptime_seconds(),
    })
}

/// Image upload plus the raw text fields of one render form.
struct RenderForm {
    artifacts: Option<RenderArtifacts>,
    fields: RawRenderFields,
}

async fn render(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|rejection| ApiError::Validation {
        message: IMAGE_REQUIRED.to_string(),
        details: Some(rejection.body_text()),
    })?;
    let form = read_form(&state, multipart).await?;
    let Some(mut artifacts) = form.artifacts else {
        return Err(ApiError::validation(IMAGE_REQUIRED));
    };
    let Some(input_path) = artifacts.input_path().map(|path| path.to_path_buf()) else {
        return Err(ApiError::validation(IMAGE_REQUIRED));
    };

    let request = RenderRequest::from_raw(
        input_path,
        &form.fields,
        state.config().render.max_text_chars,
    );
    let renderer = state.renderer();
    let mut job = renderer.prepare(&request);
    artifacts.track_output(job.output_path.clone());
    info!(job_id = %job.id, motion = %request.motion(), duration_s = request.duration_seconds(), "render requested");

    let output_path = match renderer.execute(&mut job).await {
        Ok(path) => path,
        Err(error) => {
            artifacts.cleanup().await;
            return Err(ApiError::Render(error));
        }
    };

    let file = match File::open(&output_path).await {
        Ok(file) => file,
        Err(error) => {
            artifacts.cleanup().await;
            return Err(ApiError::Stream(error));
        }
    };
    let length = file.metadata().await.ok().map(|metadata| metadata.len());

    let body = Body::from_stream(CleanupStream::new(ReaderStream::new(file), artifacts));
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
        );
    if let Some(length) = length {
        response = response.header(header::CONTENT_LENGTH, length);
    }
    response
        .body(body)
        .map_err(|error| ApiError::Unexpected(error.to_string()))
}

async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<RenderForm, ApiError> {
    let mut form = RenderForm {
        artifacts: None,
        fields: RawRenderFields::default(),
    };
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name == "image" {
            if form.artifacts.is_some() {
                return Err(ApiError::validation("Unexpected field"));
            }
            form.artifacts = Some(store_image(state, field).await?);
            continue;
        }
        let value = field.text().await.map_err(multipart_error)?;
        if !form.fields.set(&name, value) {
            debug!(field = %name, "ignoring unknown form field");
        }
    }
    Ok(form)
}

async fn store_image(state: &AppState, field: Field<'_>) -> Result<RenderArtifacts, ApiError> {
    let content_type = field.content_type().map(str::to_owned);
    let bytes = field.bytes().await.map_err(multipart_error)?;

    let limit = state.config().server.upload_limit_bytes();
    if bytes.len() > limit {
        return Err(ApiError::validation(FILE_TOO_LARGE));
    }
    let format = accept_image(content_type.as_deref(), &bytes)?;

    let path = state.renderer().storage().upload_path(format);
    let artifacts = RenderArtifacts::new(path.clone());
    fs::write(&path, &bytes)
        .await
        .map_err(|error| ApiError::Unexpected(format!("failed to store upload: {error}")))?;
    debug!(path = %path.display(), ?format, size = bytes.len(), "upload stored");
    Ok(artifacts)
}

/// The request body cap surfaces as a stream read failure; report it the same
/// way as an oversized image field.
fn multipart_error(error: MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::validation(FILE_TOO_LARGE);
    }
    ApiError::Validation {
        message: error.body_text(),
        details: None,
    }
}
