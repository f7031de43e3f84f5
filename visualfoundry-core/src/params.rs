use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DURATION_SECONDS: f64 = 8.0;
pub const MIN_DURATION_SECONDS: f64 = 5.0;
pub const MAX_DURATION_SECONDS: f64 = 20.0;
pub const MIN_FRAME_COUNT: u32 = 90;

/// Resolves the requested clip length. Absent, unparsable, zero and non-finite
/// values fall back to the default before clamping into `[5, 20]`.
pub fn resolve_duration(raw: Option<&str>) -> f64 {
    let requested = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value != 0.0)
        .unwrap_or(DEFAULT_DURATION_SECONDS);
    requested.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS)
}

pub fn frame_count(duration_seconds: f64, fps: u32) -> u32 {
    let frames = (duration_seconds * f64::from(fps)).floor();
    if frames.is_finite() && frames > f64::from(MIN_FRAME_COUNT) {
        frames as u32
    } else {
        MIN_FRAME_COUNT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionProfile {
    #[default]
    Cinematic,
    Pulse,
    Pan,
}

impl MotionProfile {
    /// Unknown or missing values select the cinematic push-in.
    pub fn from_request(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.parse().ok()).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotionProfile::Cinematic => "cinematic",
            MotionProfile::Pulse => "pulse",
            MotionProfile::Pan => "pan",
        }
    }

    /// zoompan has no wall-clock variable, so elapsed time is derived from the
    /// output frame number.
    pub fn expression(&self, duration_seconds: f64, fps: u32) -> MotionExpression {
        let elapsed = format!("on/{fps}");
        match self {
            MotionProfile::Pulse => MotionExpression {
                zoom: format!("1.05+0.05*sin(2*PI*({elapsed})/{duration_seconds})"),
                x: None,
                y: None,
            },
            MotionProfile::Pan => MotionExpression {
                zoom: "1.05".to_string(),
                x: Some(format!("iw*0.02*({elapsed})/{duration_seconds}")),
                y: Some(format!("ih*0.02*({elapsed})/{duration_seconds}")),
            },
            MotionProfile::Cinematic => MotionExpression {
                zoom: "min(zoom+0.0025,1.18)".to_string(),
                x: None,
                y: None,
            },
        }
    }
}

impl fmt::Display for MotionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotionProfile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cinematic" => Ok(MotionProfile::Cinematic),
            "pulse" => Ok(MotionProfile::Pulse),
            "pan" => Ok(MotionProfile::Pan),
            other => Err(format!("unknown motion profile: {other}")),
        }
    }
}

/// zoompan expressions for one profile. Offsets are only set for profiles that
/// move the crop window.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionExpression {
    pub zoom: String,
    pub x: Option<String>,
    pub y: Option<String>,
}
