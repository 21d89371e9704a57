//! Easing curves
//!
//! Every curve maps `[0, 1]` onto `[0, 1]` with `f(0) = 0` and `f(1) = 1`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingKind {
    #[default]
    Linear,
    /// Smoothstep, `3t² - 2t³`
    EaseInOut,
    EaseIn,
    EaseOut,
    /// Quadratic in to the midpoint, quadratic out after it
    Bounce,
}

impl EasingKind {
    /// Parse an easing name. Unknown names fall back to `Linear`.
    pub fn parse(name: &str) -> EasingKind {
        match name.trim().to_lowercase().as_str() {
            "linear" => EasingKind::Linear,
            "ease_in_out" | "easeinout" | "ease-in-out" => EasingKind::EaseInOut,
            "ease_in" | "easein" | "ease-in" => EasingKind::EaseIn,
            "ease_out" | "easeout" | "ease-out" => EasingKind::EaseOut,
            "bounce" => EasingKind::Bounce,
            _ => EasingKind::Linear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EasingKind::Linear => "linear",
            EasingKind::EaseInOut => "ease_in_out",
            EasingKind::EaseIn => "ease_in",
            EasingKind::EaseOut => "ease_out",
            EasingKind::Bounce => "bounce",
        }
    }

    /// Apply the curve. Input is clamped to `[0, 1]`.
    pub fn apply(&self, t: f64) -> f64 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            EasingKind::Linear => t,
            EasingKind::EaseInOut => 3.0 * t * t - 2.0 * t * t * t,
            EasingKind::EaseIn => t * t,
            EasingKind::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            EasingKind::Bounce => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - 2.0 * (1.0 - t) * (1.0 - t)
                }
            }
        }
    }
}

impl fmt::Display for EasingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
