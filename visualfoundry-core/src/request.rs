use std::path::{Path, PathBuf};

use crate::params::{frame_count, resolve_duration, MotionProfile};
use crate::sanitize::{sanitize_color, sanitize_text_bounded, DEFAULT_TAGLINE, DEFAULT_TITLE};

/// Text fields exactly as they arrived from the client. Every field is optional
/// and untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRenderFields {
    pub title: Option<String>,
    pub tagline: Option<String>,
    pub accent_color: Option<String>,
    pub duration: Option<String>,
    pub motion: Option<String>,
}

impl RawRenderFields {
    /// Records a multipart text field. Unknown names are ignored; the boolean
    /// reports whether the field was recognized.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "title" => &mut self.title,
            "tagline" => &mut self.tagline,
            "accentColor" => &mut self.accent_color,
            "duration" => &mut self.duration,
            "motion" => &mut self.motion,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// A validated render request. Only constructible through [`RenderRequest::from_raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    input_path: PathBuf,
    title: String,
    tagline: String,
    accent_color: String,
    duration_seconds: f64,
    motion: MotionProfile,
}

impl RenderRequest {
    pub fn from_raw(input_path: PathBuf, raw: &RawRenderFields, max_text_chars: usize) -> Self {
        Self {
            input_path,
            title: sanitize_text_bounded(raw.title.as_deref(), DEFAULT_TITLE, max_text_chars),
            tagline: sanitize_text_bounded(raw.tagline.as_deref(), DEFAULT_TAGLINE, max_text_chars),
            accent_color: sanitize_color(raw.accent_color.as_deref()),
            duration_seconds: resolve_duration(raw.duration.as_deref()),
            motion: MotionProfile::from_request(raw.motion.as_deref()),
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tagline(&self) -> &str {
        &self.tagline
    }

    pub fn accent_color(&self) -> &str {
        &self.accent_color
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn motion(&self) -> MotionProfile {
        self.motion
    }

    pub fn frame_count(&self, fps: u32) -> u32 {
        frame_count(self.duration_seconds, fps)
    }
}
