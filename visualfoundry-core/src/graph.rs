//! Typed construction of the `-filter_complex` description.
//!
//! The chain is fixed: scale, motion (fused with pixel-format normalization),
//! background band, title, tagline. Each stage names its input and output pad so
//! the rendered description never depends on ffmpeg's implicit linking.

use std::fmt;

use thiserror::Error;

use crate::config::RenderSection;
use crate::request::RenderRequest;

pub const PRIMARY_INPUT_PAD: &str = "0:v";
pub const OUTPUT_PAD: &str = "out";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Scale,
    Motion,
    DrawBox,
    DrawText,
}

impl FilterKind {
    pub fn filter_name(&self) -> &'static str {
        match self {
            FilterKind::Scale => "scale",
            FilterKind::Motion => "zoompan",
            FilterKind::DrawBox => "drawbox",
            FilterKind::DrawText => "drawtext",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Emitted verbatim. Only used for values produced by this crate.
    Plain(String),
    /// Arithmetic expression wrapped in quotes so commas stay inside the option.
    Expr(String),
    /// Sanitized user text. Quoted, with graph-level escaping for quotes and
    /// backslashes so the option-level escape survives the first parsing pass.
    Text(String),
}

impl ParamValue {
    fn plain(value: impl ToString) -> Self {
        ParamValue::Plain(value.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Plain(value) => f.write_str(value),
            ParamValue::Expr(value) => write!(f, "'{value}'"),
            ParamValue::Text(value) => {
                f.write_str("'")?;
                for ch in value.chars() {
                    match ch {
                        '\'' | '\\' => write!(f, "'\\{ch}'")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("'")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    pub kind: FilterKind,
    pub parameters: Vec<(&'static str, ParamValue)>,
    /// Filters applied in-line after the primary one, before the output pad.
    pub fused: Vec<String>,
    pub input_pad: String,
    pub output_pad: String,
}

impl FilterStage {
    fn new(kind: FilterKind, input_pad: &str, output_pad: &str) -> Self {
        Self {
            kind,
            parameters: Vec::new(),
            fused: Vec::new(),
            input_pad: input_pad.to_string(),
            output_pad: output_pad.to_string(),
        }
    }

    fn param(mut self, key: &'static str, value: ParamValue) -> Self {
        self.parameters.push((key, value));
        self
    }

    fn fuse(mut self, filter: String) -> Self {
        self.fused.push(filter);
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&ParamValue> {
        self.parameters
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.input_pad, self.kind.filter_name())?;
        for (index, (key, value)) in self.parameters.iter().enumerate() {
            let separator = if index == 0 { '=' } else { ':' };
            write!(f, "{separator}{key}={value}")?;
        }
        for filter in &self.fused {
            write!(f, ",{filter}")?;
        }
        write!(f, "[{}]", self.output_pad)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("stage {index} reads [{found}] but the previous stage produced [{expected}]")]
    BrokenChain {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("graph ends at [{found}] instead of [{expected}]")]
    WrongOutput { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    pub stages: Vec<FilterStage>,
    pub output_pad: String,
}

impl FilterGraph {
    /// Renders the description passed to `-filter_complex`.
    pub fn to_filter_complex(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn kinds(&self) -> Vec<FilterKind> {
        self.stages.iter().map(|stage| stage.kind).collect()
    }

    /// Checks that every stage consumes the pad produced by the stage before it.
    pub fn validate_chain(&self) -> Result<(), GraphError> {
        let mut expected: &str = PRIMARY_INPUT_PAD;
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.input_pad != expected {
                return Err(GraphError::BrokenChain {
                    index,
                    expected: expected.to_string(),
                    found: stage.input_pad.clone(),
                });
            }
            expected = stage.output_pad.as_str();
        }
        if expected != self.output_pad {
            return Err(GraphError::WrongOutput {
                expected: self.output_pad.clone(),
                found: expected.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GraphBuilder {
    render: RenderSection,
    pix_fmt: String,
}

impl GraphBuilder {
    pub fn new(render: RenderSection, pix_fmt: impl Into<String>) -> Self {
        Self {
            render,
            pix_fmt: pix_fmt.into(),
        }
    }

    pub fn build(&self, request: &RenderRequest) -> FilterGraph {
        let render = &self.render;
        let duration = request.duration_seconds();
        let frames = request.frame_count(render.fps);
        let motion = request.motion().expression(duration, render.fps);

        let scale = FilterStage::new(FilterKind::Scale, PRIMARY_INPUT_PAD, "scaled")
            .param("w", ParamValue::plain(render.width))
            .param("h", ParamValue::plain(-1));

        let mut zoom = FilterStage::new(FilterKind::Motion, "scaled", "video")
            .param("z", ParamValue::Expr(motion.zoom));
        if let Some(x) = motion.x {
            zoom = zoom.param("x", ParamValue::Expr(x));
        }
        if let Some(y) = motion.y {
            zoom = zoom.param("y", ParamValue::Expr(y));
        }
        let zoom = zoom
            .param("d", ParamValue::plain(frames))
            .param(
                "s",
                ParamValue::Plain(format!("{}x{}", render.width, render.height)),
            )
            .param("fps", ParamValue::plain(render.fps))
            .fuse(format!("format={}", self.pix_fmt));

        let band = FilterStage::new(FilterKind::DrawBox, "video", "boxed")
            .param("x", ParamValue::plain(0))
            .param("y", ParamValue::Plain(format!("h-{}", render.band_height)))
            .param("w", ParamValue::plain("iw"))
            .param("h", ParamValue::plain(render.band_height))
            .param("color", ParamValue::plain("black@0.55"))
            .param("t", ParamValue::plain("fill"));

        let title = FilterStage::new(FilterKind::DrawText, "boxed", "title")
            .param("fontfile", ParamValue::Text(render.title_font.clone()))
            .param("expansion", ParamValue::plain("none"))
            .param("text", ParamValue::Text(request.title().to_string()))
            .param("fontsize", ParamValue::plain(60))
            .param("fontcolor", ParamValue::plain("white@0.97"))
            .param("x", ParamValue::plain(80))
            .param("y", ParamValue::plain("h-200"))
            .param("shadowcolor", ParamValue::plain("black@0.4"))
            .param("shadowx", ParamValue::plain(2))
            .param("shadowy", ParamValue::plain(2));

        let tagline = FilterStage::new(FilterKind::DrawText, "title", OUTPUT_PAD)
            .param("fontfile", ParamValue::Text(render.tagline_font.clone()))
            .param("expansion", ParamValue::plain("none"))
            .param("text", ParamValue::Text(request.tagline().to_string()))
            .param("fontsize", ParamValue::plain(40))
            .param(
                "fontcolor",
                ParamValue::Plain(format!("{}@0.98", request.accent_color())),
            )
            .param("x", ParamValue::plain(80))
            .param("y", ParamValue::plain("h-120"));

        let graph = FilterGraph {
            stages: vec![scale, zoom, band, title, tagline],
            output_pad: OUTPUT_PAD.to_string(),
        };
        debug_assert!(graph.validate_chain().is_ok());
        graph
    }
}
