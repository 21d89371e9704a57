//! Parameter transitions
//!
//! A transition interpolates one parameter from a start value to a target
//! over a fixed duration. Progress is always derived from time, never stored.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use marionette_core::EmotionKind;

use crate::EasingKind;

/// What issued a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    Emotion(EmotionKind),
    Manual,
}

/// Eased interpolation of one parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTransition {
    pub parameter: String,
    pub start_value: f64,
    pub target_value: f64,
    /// Session time in seconds
    pub start_time: f64,
    /// Seconds; non-positive durations complete immediately
    pub duration: f64,
    pub easing: EasingKind,
    pub source: TransitionSource,
}

impl ParameterTransition {
    pub fn new(
        parameter: impl Into<String>,
        start_value: f64,
        target_value: f64,
        start_time: f64,
        duration: f64,
        easing: EasingKind,
        source: TransitionSource,
    ) -> Self {
        ParameterTransition {
            parameter: parameter.into(),
            start_value,
            target_value,
            start_time,
            duration,
            easing,
            source,
        }
    }

    /// Normalized progress in `[0, 1]`
    pub fn progress(&self, now: f64) -> f64 {
        if self.duration <= 0.0 || !self.duration.is_finite() {
            return 1.0;
        }
        let p = (now - self.start_time) / self.duration;
        if p.is_nan() {
            return 0.0;
        }
        p.clamp(0.0, 1.0)
    }

    /// Interpolated value at `now`. Exactly `target_value` once complete.
    pub fn value_at(&self, now: f64) -> f64 {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return self.target_value;
        }
        let eased = self.easing.apply(progress);
        self.start_value + (self.target_value - self.start_value) * eased
    }

    pub fn is_complete(&self, now: f64) -> bool {
        self.progress(now) >= 1.0
    }
}

/// Active transitions, at most one per parameter
#[derive(Debug, Default, Clone)]
pub struct TransitionSet {
    active: BTreeMap<String, ParameterTransition>,
}

impl TransitionSet {
    pub fn new() -> Self {
        TransitionSet::default()
    }

    /// Install a transition, replacing any existing one on the same parameter.
    /// Returns the replaced transition.
    pub fn install(&mut self, transition: ParameterTransition) -> Option<ParameterTransition> {
        self.active.insert(transition.parameter.clone(), transition)
    }

    pub fn get(&self, parameter: &str) -> Option<&ParameterTransition> {
        self.active.get(parameter)
    }

    pub fn contains(&self, parameter: &str) -> bool {
        self.active.contains_key(parameter)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterTransition> {
        self.active.values()
    }

    /// Drop every transition whose parameter fails the predicate
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.active.retain(|name, _| keep(name));
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Advance every transition to `now`, writing interpolated values.
    ///
    /// Completed transitions are removed. The returned set names every
    /// parameter that was owned by a transition during this tick, including
    /// the ones that just completed.
    pub fn advance(&mut self, now: f64, values: &mut HashMap<String, f64>) -> BTreeSet<String> {
        let mut owned = BTreeSet::new();
        let mut completed = Vec::new();

        for (name, transition) in &self.active {
            values.insert(name.clone(), transition.value_at(now));
            owned.insert(name.clone());
            if transition.is_complete(now) {
                completed.push(name.clone());
            }
        }

        for name in completed {
            self.active.remove(&name);
        }

        owned
    }
}
