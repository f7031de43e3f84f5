//! Normalization of untrusted text and color fields before they are embedded
//! into an ffmpeg filter graph.
//!
//! Both entry points are total: malformed input never produces an error, only a
//! safe replacement value.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_ACCENT_COLOR: &str = "#f6c344";
pub const DEFAULT_TITLE: &str = "Cinematic Graphic";
pub const DEFAULT_TAGLINE: &str = "Generated from your upload";
pub const DEFAULT_MAX_TEXT_CHARS: usize = 80;

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid regex"))
}

/// Sanitizes an overlay string with the default length bound.
pub fn sanitize_text(value: Option<&str>, fallback: &str) -> String {
    sanitize_text_bounded(value, fallback, DEFAULT_MAX_TEXT_CHARS)
}

/// Trims `value`, substitutes `fallback` when nothing is left, caps the result at
/// `max_chars` visible characters and neutralizes filter-graph metacharacters.
///
/// Colons, backslashes and control characters (line breaks, NUL) become spaces;
/// single quotes are escaped as `\'` so the value cannot close a quoted filter
/// option.
pub fn sanitize_text_bounded(value: Option<&str>, fallback: &str, max_chars: usize) -> String {
    let trimmed = value.map(str::trim).unwrap_or_default();
    let chosen = if trimmed.is_empty() {
        fallback.trim()
    } else {
        trimmed
    };

    let mut safe = String::with_capacity(chosen.len());
    for ch in chosen.chars().take(max_chars) {
        match ch {
            ':' | '\\' => safe.push(' '),
            '\'' => safe.push_str("\\'"),
            ch if ch.is_control() => safe.push(' '),
            other => safe.push(other),
        }
    }
    safe
}

/// Returns `value` when it is exactly `#RRGGBB`, otherwise the default accent.
pub fn sanitize_color(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(hex) if color_pattern().is_match(hex) => hex.to_string(),
        _ => DEFAULT_ACCENT_COLOR.to_string(),
    }
}
