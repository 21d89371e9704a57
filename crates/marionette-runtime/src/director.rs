//! Emotion director
//!
//! Turns emotion and manual parameter commands into eased transitions.
//! A new command on a parameter always replaces the running transition and
//! starts from wherever that transition currently is. Names are stored under
//! their canonical key for the active profile, so a semantic name and the
//! host name it maps to address the same transition.

use std::time::Duration;

use marionette_core::{CapabilityProfile, EmotionKind, MarionetteError};
use marionette_motion::{EasingKind, ParameterTransition, TransitionSource};
use tracing::{debug, warn};

use crate::scheduler::AnimationState;

/// Duration of each emotion applied from speech
pub const SPEECH_TRANSITION_SECS: f64 = 1.5;
/// Pause between consecutive speech emotions
pub const SPEECH_PAUSE: Duration = Duration::from_millis(200);

/// Parse an emotion name. Unknown names become `Neutral` with a warning.
pub fn resolve_emotion(name: &str) -> EmotionKind {
    let (kind, known) = EmotionKind::parse_or_neutral(name);
    if !known {
        warn!("Unknown emotion '{}', using neutral", name);
    }
    kind
}

/// Install transitions toward `kind`'s profile scaled by `intensity`.
///
/// Returns false, leaving state untouched, when the table has no profile
/// for `kind`.
pub fn apply_emotion(
    state: &mut AnimationState,
    profile: &CapabilityProfile,
    kind: EmotionKind,
    intensity: f64,
    duration: f64,
    easing: EasingKind,
    now: f64,
) -> bool {
    let Some(targets) = state.emotions.get(kind).cloned() else {
        warn!("No expression profile for emotion '{}'", kind);
        return false;
    };

    let intensity = if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        0.0
    };

    for (param, target) in targets {
        let param = profile.canonical_name(&param);
        let start = state.start_value(param, now);
        state.transitions.install(ParameterTransition::new(
            param,
            start,
            target * intensity,
            now,
            duration,
            easing,
            TransitionSource::Emotion(kind),
        ));
    }

    state.current_emotion = kind;
    state.emotion_intensity = intensity;
    debug!("Emotion {} at {:.2} over {:.2}s", kind, intensity, duration);
    true
}

/// Install a manual transition on one parameter. Non-finite targets are
/// ignored.
pub fn apply_parameter(
    state: &mut AnimationState,
    profile: &CapabilityProfile,
    name: &str,
    value: f64,
    duration: f64,
    easing: EasingKind,
    now: f64,
) -> bool {
    if !value.is_finite() {
        warn!("Ignoring non-finite value for {}", name);
        return false;
    }
    if profile.resolve(name).is_none() {
        // Kept anyway; a later profile may map it
        debug!("{}", MarionetteError::UnmappedParameter(name.to_string()));
    }
    let name = profile.canonical_name(name);
    let start = state.start_value(name, now);
    state.transitions.install(ParameterTransition::new(
        name,
        start,
        value,
        now,
        duration,
        easing,
        TransitionSource::Manual,
    ));
    true
}

/// Intensity used for speech-detected emotions, or `None` when automatic
/// detection is off
pub fn speech_intensity(state: &AnimationState, intensity: f64) -> Option<f64> {
    if !state.auto_emotion_detection {
        return None;
    }
    let scaled = intensity * state.emotion_intensity_multiplier;
    Some(if scaled.is_finite() {
        scaled.clamp(0.0, 1.0)
    } else {
        0.0
    })
}
