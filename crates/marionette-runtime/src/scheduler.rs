//! Animation scheduler
//!
//! Per-tick pipeline, in order:
//! 1. Advance transitions (completed ones are dropped after writing their target)
//! 2. Background pass for parameters no transition owns
//! 3. Resolve names and clamp against the capability profile
//!
//! Dispatch and frame pacing live in the controller's tick loop. Everything
//! here is synchronous and driven by an explicit `now`.

use std::collections::{BTreeMap, HashMap};

use marionette_core::{
    CapabilityProfile, EmotionKind, EmotionProfileTable, ParameterValue,
};
use marionette_motion::{BackgroundMotionEngine, TransitionSet};
use serde::Serialize;
use tracing::trace;

/// Scheduler lifecycle. A shut-down scheduler never runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    ShutDown,
}

/// Everything the tick loop and the public setters share
#[derive(Debug, Clone)]
pub struct AnimationState {
    pub transitions: TransitionSet,
    /// Last computed value per controller-side parameter name
    pub current_values: HashMap<String, f64>,
    pub background: BackgroundMotionEngine,
    pub emotions: EmotionProfileTable,
    pub current_emotion: EmotionKind,
    pub emotion_intensity: f64,
    pub emotion_intensity_multiplier: f64,
    pub auto_emotion_detection: bool,
    /// Profile generation the transitions were last checked against
    profile_generation: u64,
}

impl Default for AnimationState {
    fn default() -> Self {
        AnimationState {
            transitions: TransitionSet::new(),
            current_values: HashMap::new(),
            background: BackgroundMotionEngine::default(),
            emotions: EmotionProfileTable::default(),
            current_emotion: EmotionKind::Neutral,
            emotion_intensity: 0.0,
            emotion_intensity_multiplier: 0.8,
            auto_emotion_detection: true,
            profile_generation: 0,
        }
    }
}

impl AnimationState {
    pub fn new(emotion_intensity_multiplier: f64, auto_emotion_detection: bool) -> Self {
        AnimationState {
            emotion_intensity_multiplier,
            auto_emotion_detection,
            ..Default::default()
        }
    }

    /// Value a new transition on `parameter` should start from: the live
    /// interpolated value if one is running, else the last written value.
    pub fn start_value(&self, parameter: &str, now: f64) -> f64 {
        match self.transitions.get(parameter) {
            Some(active) => active.value_at(now),
            None => self.current_values.get(parameter).copied().unwrap_or(0.0),
        }
    }

    /// Drop transitions and stored values whose parameter no longer
    /// resolves against a newly installed profile. Cheap no-op while the
    /// generation is unchanged. Returns the number of transitions dropped.
    pub fn prune_for_profile(&mut self, profile: &CapabilityProfile, generation: u64) -> usize {
        if generation == self.profile_generation {
            return 0;
        }
        self.profile_generation = generation;

        let before = self.transitions.len();
        self.transitions.retain(|name| profile.resolve(name).is_some());
        let dropped = before - self.transitions.len();

        let stale = self.current_values.len();
        self.current_values
            .retain(|name, _| profile.resolve(name).is_some());
        let stale = stale - self.current_values.len();

        if dropped > 0 || stale > 0 {
            trace!(
                "Dropped {} transitions and {} stored values after profile change",
                dropped,
                stale
            );
        }
        dropped
    }
}

/// Host-ready values for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameBatch {
    /// Host name/value pairs, sorted by host name
    pub values: Vec<ParameterValue>,
    /// Controller-side names that did not resolve
    pub unmapped: Vec<String>,
}

impl FrameBatch {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, host_name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|p| p.name == host_name)
            .map(|p| p.value)
    }
}

/// Run one tick of the animation pipeline at session time `now`
pub fn compute_frame(
    state: &mut AnimationState,
    now: f64,
    profile: &CapabilityProfile,
    generation: u64,
) -> FrameBatch {
    state.prune_for_profile(profile, generation);

    // Stage 1: transitions. Parameters finishing this tick still count as owned.
    let owned = state.transitions.advance(now, &mut state.current_values);

    // Stage 2: background motion on everything else
    state
        .background
        .apply(now, &mut state.current_values, |param| owned.contains(param));

    // Stage 3: resolve and clamp
    map_and_clamp(&state.current_values, profile)
}

/// Resolve every value to its host name and clamp it to the host range.
/// Unmapped names and non-finite values never reach the batch.
pub fn map_and_clamp(values: &HashMap<String, f64>, profile: &CapabilityProfile) -> FrameBatch {
    let mut names: Vec<&String> = values.keys().collect();
    names.sort();

    let mut resolved: BTreeMap<String, f64> = BTreeMap::new();
    let mut unmapped = Vec::new();

    for name in names {
        let value = values[name];
        if !value.is_finite() {
            trace!("Skipping non-finite value for {}", name);
            continue;
        }
        match profile.resolve(name) {
            Some(host) => {
                resolved.insert(host.to_string(), profile.clamp(host, value));
            }
            None => {
                trace!("Unmapped parameter {}", name);
                unmapped.push(name.clone());
            }
        }
    }

    FrameBatch {
        values: resolved
            .into_iter()
            .map(|(name, value)| ParameterValue::new(name, value))
            .collect(),
        unmapped,
    }
}
