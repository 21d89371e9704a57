//! Parameter values, ranges and semantic names

use serde::{Deserialize, Serialize};

/// Declared `[min, max]` range of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    /// Range assumed for parameters the host never declared
    pub const DEFAULT: ParameterRange = ParameterRange { min: -1.0, max: 1.0 };

    /// Create a range, swapping the bounds if they arrive inverted
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            ParameterRange { min, max }
        } else {
            ParameterRange { min: max, max: min }
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

impl Default for ParameterRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A single host parameter assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: f64,
}

impl ParameterValue {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        ParameterValue {
            name: name.into(),
            value,
        }
    }
}

/// Canonical semantic names and the literal host names that may carry them,
/// in preference order
pub const SEMANTIC_CANDIDATES: &[(&str, &[&str])] = &[
    // Face position and rotation
    ("face_x", &["FacePositionX", "HeadX", "Face_X"]),
    ("face_y", &["FacePositionY", "HeadY", "Face_Y"]),
    ("face_rotation", &["FaceRotationZ", "HeadRotZ", "Face_Rotation"]),
    // Eyes
    ("eye_left_open", &["EyeOpenLeft", "LeftEyeOpen", "Eye_L_Open"]),
    ("eye_right_open", &["EyeOpenRight", "RightEyeOpen", "Eye_R_Open"]),
    ("eyeball_x", &["EyeballX", "EyesX", "Eye_X"]),
    ("eyeball_y", &["EyeballY", "EyesY", "Eye_Y"]),
    // Brows
    ("brow_left", &["BrowLeftY", "LeftBrowY", "Brow_L_Y"]),
    ("brow_right", &["BrowRightY", "RightBrowY", "Brow_R_Y"]),
    // Mouth
    ("mouth_open", &["MouthOpenY", "MouthOpen", "Mouth_Open_Y"]),
    ("mouth_form", &["MouthForm", "MouthShape", "Mouth_Form"]),
    ("mouth_smile", &["MouthSmile", "Smile", "Mouth_Smile"]),
    // Body
    ("body_rotation_x", &["BodyRotationX", "BodyX", "Body_Rot_X"]),
    ("body_rotation_y", &["BodyRotationY", "BodyY", "Body_Rot_Y"]),
    ("body_rotation_z", &["BodyRotationZ", "BodyZ", "Body_Rot_Z"]),
];

/// Host parameters assumed when discovery is unavailable
pub const DEFAULT_HOST_PARAMETERS: [&str; 11] = [
    "FacePositionX",
    "FacePositionY",
    "FaceRotationZ",
    "EyeOpenLeft",
    "EyeOpenRight",
    "EyeballX",
    "EyeballY",
    "BrowLeftY",
    "BrowRightY",
    "MouthForm",
    "MouthOpenY",
];

/// Candidate host names for a semantic name
pub fn candidates_for(semantic: &str) -> Option<&'static [&'static str]> {
    SEMANTIC_CANDIDATES
        .iter()
        .find(|(name, _)| *name == semantic)
        .map(|(_, candidates)| *candidates)
}

pub fn is_semantic_name(name: &str) -> bool {
    candidates_for(name).is_some()
}
