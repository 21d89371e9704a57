//! Emotion kinds, profile table and keyword lexicon
//!
//! An emotion is expressed as a set of semantic parameter targets in `[-1, 1]`.
//! The targets are scaled by intensity when the emotion is applied.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MarionetteError;

/// Closed set of emotions the controller can express
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionKind {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    Contempt,
    Neutral,
    Excited,
    Confused,
    Sleepy,
    Focused,
    Love,
    Embarrassed,
    Determined,
    Playful,
    Mischievous,
    Serene,
}

impl EmotionKind {
    pub const ALL: [EmotionKind; 18] = [
        EmotionKind::Happy,
        EmotionKind::Sad,
        EmotionKind::Angry,
        EmotionKind::Surprised,
        EmotionKind::Fearful,
        EmotionKind::Disgusted,
        EmotionKind::Contempt,
        EmotionKind::Neutral,
        EmotionKind::Excited,
        EmotionKind::Confused,
        EmotionKind::Sleepy,
        EmotionKind::Focused,
        EmotionKind::Love,
        EmotionKind::Embarrassed,
        EmotionKind::Determined,
        EmotionKind::Playful,
        EmotionKind::Mischievous,
        EmotionKind::Serene,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionKind::Happy => "happy",
            EmotionKind::Sad => "sad",
            EmotionKind::Angry => "angry",
            EmotionKind::Surprised => "surprised",
            EmotionKind::Fearful => "fearful",
            EmotionKind::Disgusted => "disgusted",
            EmotionKind::Contempt => "contempt",
            EmotionKind::Neutral => "neutral",
            EmotionKind::Excited => "excited",
            EmotionKind::Confused => "confused",
            EmotionKind::Sleepy => "sleepy",
            EmotionKind::Focused => "focused",
            EmotionKind::Love => "love",
            EmotionKind::Embarrassed => "embarrassed",
            EmotionKind::Determined => "determined",
            EmotionKind::Playful => "playful",
            EmotionKind::Mischievous => "mischievous",
            EmotionKind::Serene => "serene",
        }
    }

    /// Look up a kind by name, accepting legacy expression aliases.
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn from_name(name: &str) -> Option<EmotionKind> {
        let lowered = name.trim().to_lowercase();
        if let Some(kind) = Self::ALL.iter().find(|k| k.as_str() == lowered) {
            return Some(*kind);
        }

        match lowered.as_str() {
            "joy" | "laugh" => Some(EmotionKind::Happy),
            "sadness" | "cry" => Some(EmotionKind::Sad),
            "anger" => Some(EmotionKind::Angry),
            "surprise" => Some(EmotionKind::Surprised),
            "scared" => Some(EmotionKind::Fearful),
            "wink" => Some(EmotionKind::Playful),
            "blush" => Some(EmotionKind::Embarrassed),
            _ => None,
        }
    }

    /// Resolve a name, mapping anything unrecognized to `Neutral`.
    /// The flag is false when the fallback was taken.
    pub fn parse_or_neutral(name: &str) -> (EmotionKind, bool) {
        match Self::from_name(name) {
            Some(kind) => (kind, true),
            None => (EmotionKind::Neutral, false),
        }
    }
}

impl Default for EmotionKind {
    fn default() -> Self {
        EmotionKind::Neutral
    }
}

impl fmt::Display for EmotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionKind {
    type Err = MarionetteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| MarionetteError::UnknownEmotion(s.to_string()))
    }
}

/// Semantic parameter targets for one emotion
pub type EmotionTargets = BTreeMap<String, f64>;

/// Emotion -> semantic parameter targets
#[derive(Debug, Clone)]
pub struct EmotionProfileTable {
    profiles: HashMap<EmotionKind, EmotionTargets>,
}

fn targets(pairs: &[(&str, f64)]) -> EmotionTargets {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

impl Default for EmotionProfileTable {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            EmotionKind::Happy,
            targets(&[
                ("mouth_smile", 0.8),
                ("eye_left_open", 0.9),
                ("eye_right_open", 0.9),
                ("brow_left", 0.1),
                ("brow_right", 0.1),
            ]),
        );
        profiles.insert(
            EmotionKind::Sad,
            targets(&[
                ("mouth_form", -0.6),
                ("eye_left_open", 0.3),
                ("eye_right_open", 0.3),
                ("brow_left", -0.3),
                ("brow_right", -0.3),
                ("face_y", -0.1),
            ]),
        );
        profiles.insert(
            EmotionKind::Angry,
            targets(&[
                ("mouth_form", -0.4),
                ("brow_left", -0.8),
                ("brow_right", -0.8),
                ("eye_left_open", 0.6),
                ("eye_right_open", 0.6),
            ]),
        );
        profiles.insert(
            EmotionKind::Surprised,
            targets(&[
                ("eye_left_open", 1.0),
                ("eye_right_open", 1.0),
                ("mouth_open", 0.5),
                ("brow_left", 0.6),
                ("brow_right", 0.6),
            ]),
        );
        profiles.insert(
            EmotionKind::Fearful,
            targets(&[
                ("eye_left_open", 1.0),
                ("eye_right_open", 1.0),
                ("brow_left", 0.4),
                ("brow_right", 0.4),
                ("mouth_form", -0.3),
                ("face_y", 0.1),
            ]),
        );
        profiles.insert(
            EmotionKind::Excited,
            targets(&[
                ("eye_left_open", 1.0),
                ("eye_right_open", 1.0),
                ("mouth_smile", 1.0),
                ("brow_left", 0.3),
                ("brow_right", 0.3),
                ("face_y", 0.05),
            ]),
        );
        profiles.insert(
            EmotionKind::Sleepy,
            targets(&[
                ("eye_left_open", 0.2),
                ("eye_right_open", 0.2),
                ("mouth_form", 0.1),
                ("face_y", -0.05),
            ]),
        );
        profiles.insert(
            EmotionKind::Love,
            targets(&[
                ("eye_left_open", 0.7),
                ("eye_right_open", 0.7),
                ("mouth_smile", 0.6),
                ("brow_left", 0.2),
                ("brow_right", 0.2),
            ]),
        );
        profiles.insert(
            EmotionKind::Embarrassed,
            targets(&[
                ("eye_left_open", 0.4),
                ("eye_right_open", 0.4),
                ("mouth_form", 0.3),
                ("face_rotation", 0.1),
            ]),
        );
        // Asymmetric eyes read as a wink
        profiles.insert(
            EmotionKind::Playful,
            targets(&[
                ("eye_left_open", 0.8),
                ("eye_right_open", 1.0),
                ("mouth_smile", 0.7),
                ("face_rotation", 0.05),
            ]),
        );
        profiles.insert(
            EmotionKind::Neutral,
            targets(&[
                ("eye_left_open", 0.8),
                ("eye_right_open", 0.8),
                ("mouth_form", 0.0),
                ("brow_left", 0.0),
                ("brow_right", 0.0),
            ]),
        );

        EmotionProfileTable { profiles }
    }
}

impl EmotionProfileTable {
    /// Empty table with no emotion profiles
    pub fn empty() -> Self {
        EmotionProfileTable {
            profiles: HashMap::new(),
        }
    }

    pub fn get(&self, kind: EmotionKind) -> Option<&EmotionTargets> {
        self.profiles.get(&kind)
    }

    /// Install or replace the targets for one emotion.
    /// Targets are clamped into `[-1, 1]`; non-finite targets are dropped.
    pub fn set(&mut self, kind: EmotionKind, targets: EmotionTargets) {
        let cleaned = targets
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k, v.clamp(-1.0, 1.0)))
            .collect();
        self.profiles.insert(kind, cleaned);
    }

    pub fn remove(&mut self, kind: EmotionKind) -> Option<EmotionTargets> {
        self.profiles.remove(&kind)
    }

    pub fn contains(&self, kind: EmotionKind) -> bool {
        self.profiles.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Keyword lexicon, in detection order
pub const EMOTION_LEXICON: &[(EmotionKind, &[&str])] = &[
    (
        EmotionKind::Happy,
        &["happy", "joy", "smile", "laugh", "excited", "wonderful", "great", "awesome"],
    ),
    (
        EmotionKind::Sad,
        &["sad", "cry", "tear", "upset", "sorry", "unfortunate", "disappointed"],
    ),
    (
        EmotionKind::Angry,
        &["angry", "mad", "furious", "annoyed", "frustrated", "irritated"],
    ),
    (
        EmotionKind::Surprised,
        &["wow", "amazing", "incredible", "unbelievable", "shocked", "surprised"],
    ),
    (
        EmotionKind::Fearful,
        &["scared", "afraid", "fear", "worried", "nervous", "anxious"],
    ),
    (
        EmotionKind::Love,
        &["love", "adore", "cherish", "romantic", "heart", "dear"],
    ),
    (
        EmotionKind::Embarrassed,
        &["embarrassed", "shy", "blush", "awkward", "uncomfortable"],
    ),
    (
        EmotionKind::Excited,
        &["excited", "thrilled", "energetic", "enthusiastic", "pumped"],
    ),
    (
        EmotionKind::Sleepy,
        &["tired", "sleepy", "exhausted", "drowsy", "yawn"],
    ),
    (
        EmotionKind::Playful,
        &["playful", "tease", "fun", "silly", "mischief"],
    ),
    (
        EmotionKind::Confused,
        &["confused", "puzzled", "lost", "uncertain", "unclear"],
    ),
    (
        EmotionKind::Determined,
        &["determined", "focused", "committed", "resolved"],
    ),
    (
        EmotionKind::Serene,
        &["calm", "peaceful", "serene", "tranquil", "relaxed"],
    ),
];

/// Naive keyword detection. Substring matches, each kind reported once,
/// in lexicon order. Returns `[Neutral]` when nothing matches.
pub fn detect_from_text(text: &str) -> Vec<EmotionKind> {
    let lowered = text.to_lowercase();
    let mut detected: Vec<EmotionKind> = EMOTION_LEXICON
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map(|(kind, _)| *kind)
        .collect();

    if detected.is_empty() {
        detected.push(EmotionKind::Neutral);
    }
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_case_insensitive() {
        assert_eq!(EmotionKind::from_name("HAPPY"), Some(EmotionKind::Happy));
        assert_eq!(EmotionKind::from_name("  Serene "), Some(EmotionKind::Serene));
        assert_eq!(EmotionKind::from_name("blush"), Some(EmotionKind::Embarrassed));
        assert_eq!(EmotionKind::from_name("does_not_exist"), None);
    }

    #[test]
    fn test_parse_or_neutral() {
        assert_eq!(
            EmotionKind::parse_or_neutral("does_not_exist"),
            (EmotionKind::Neutral, false)
        );
        assert_eq!(EmotionKind::parse_or_neutral("sad"), (EmotionKind::Sad, true));
        assert!("nope".parse::<EmotionKind>().is_err());
    }

    #[test]
    fn test_every_kind_round_trips_through_name() {
        for kind in EmotionKind::ALL {
            assert_eq!(EmotionKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_default_table_coverage() {
        let table = EmotionProfileTable::default();
        assert_eq!(table.len(), 11);
        assert!(table.contains(EmotionKind::Neutral));
        assert!(!table.contains(EmotionKind::Contempt));

        let happy = table.get(EmotionKind::Happy).unwrap();
        assert_eq!(happy.get("mouth_smile"), Some(&0.8));
    }

    #[test]
    fn test_table_set_clamps_targets() {
        let mut table = EmotionProfileTable::empty();
        let mut t = EmotionTargets::new();
        t.insert("mouth_smile".into(), 3.0);
        t.insert("brow_left".into(), f64::NAN);
        table.set(EmotionKind::Focused, t);

        let focused = table.get(EmotionKind::Focused).unwrap();
        assert_eq!(focused.get("mouth_smile"), Some(&1.0));
        assert!(!focused.contains_key("brow_left"));
    }

    #[test]
    fn test_detect_from_text() {
        let found = detect_from_text("I'm so excited about this new feature!");
        assert_eq!(found, vec![EmotionKind::Happy, EmotionKind::Excited]);

        let found = detect_from_text("Wow, I am SCARED");
        assert_eq!(found, vec![EmotionKind::Surprised, EmotionKind::Fearful]);
    }

    #[test]
    fn test_detect_defaults_to_neutral() {
        assert_eq!(detect_from_text("the quick brown"), vec![EmotionKind::Neutral]);
        assert_eq!(detect_from_text(""), vec![EmotionKind::Neutral]);
    }
}
