//! Background motion - low-amplitude idle oscillators
//!
//! Oscillators keep the avatar alive between explicit expressions:
//! breathing, idle sway, eye drift and micro-expressions. They never
//! drive a parameter that a transition currently owns.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;

use marionette_core::ParameterRange;

/// One named periodic behavior over one or more parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundOscillator {
    pub name: String,
    pub parameter_ranges: BTreeMap<String, ParameterRange>,
    pub frequency_hz: f64,
    /// Phase offset in cycles
    pub phase_offset: f64,
    pub enabled: bool,
}

impl BackgroundOscillator {
    pub fn new(
        name: impl Into<String>,
        parameter_ranges: BTreeMap<String, ParameterRange>,
        frequency_hz: f64,
    ) -> Self {
        BackgroundOscillator {
            name: name.into(),
            parameter_ranges,
            frequency_hz,
            phase_offset: 0.0,
            enabled: true,
        }
    }

    pub fn with_phase_offset(mut self, phase_offset: f64) -> Self {
        self.phase_offset = phase_offset;
        self
    }

    /// Normalized oscillation in `[-1, 1]` at session time `now`
    pub fn oscillation(&self, now: f64) -> f64 {
        let phase = (now * self.frequency_hz + self.phase_offset) * TAU;
        phase.sin()
    }

    /// Value for one of this oscillator's parameters at `now`
    pub fn value_for(&self, range: &ParameterRange, now: f64) -> f64 {
        range.min + range.span() * (self.oscillation(now) + 1.0) / 2.0
    }

    /// Every parameter value this oscillator produces at `now`
    pub fn sample(&self, now: f64) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.parameter_ranges
            .iter()
            .map(move |(name, range)| (name.as_str(), self.value_for(range, now)))
    }
}

fn symmetric(pairs: &[(&str, f64)]) -> BTreeMap<String, ParameterRange> {
    pairs
        .iter()
        .map(|(name, amplitude)| (name.to_string(), ParameterRange::new(-amplitude, *amplitude)))
        .collect()
}

/// Registry of background oscillators
#[derive(Debug, Clone)]
pub struct BackgroundMotionEngine {
    oscillators: BTreeMap<String, BackgroundOscillator>,
}

impl Default for BackgroundMotionEngine {
    fn default() -> Self {
        let mut engine = BackgroundMotionEngine::empty();
        engine.insert(BackgroundOscillator::new(
            "breathing",
            symmetric(&[("body_rotation_x", 0.02)]),
            0.3,
        ));
        engine.insert(BackgroundOscillator::new(
            "eye_movement",
            symmetric(&[("eyeball_x", 0.3), ("eyeball_y", 0.2)]),
            0.1,
        ));
        engine.insert(BackgroundOscillator::new(
            "idle_sway",
            symmetric(&[("face_x", 0.01), ("face_rotation", 0.5)]),
            0.05,
        ));
        engine.insert(BackgroundOscillator::new(
            "micro_expressions",
            symmetric(&[("brow_left", 0.05), ("brow_right", 0.05)]),
            0.02,
        ));
        engine
    }
}

impl BackgroundMotionEngine {
    pub fn empty() -> Self {
        BackgroundMotionEngine {
            oscillators: BTreeMap::new(),
        }
    }

    /// Insert or replace an oscillator under its own name
    pub fn insert(&mut self, oscillator: BackgroundOscillator) {
        self.oscillators.insert(oscillator.name.clone(), oscillator);
    }

    /// Register a behavior; replaces an existing one with the same name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        parameter_ranges: BTreeMap<String, ParameterRange>,
        frequency_hz: f64,
    ) {
        self.insert(BackgroundOscillator::new(name, parameter_ranges, frequency_hz));
    }

    /// Returns false when no oscillator has that name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.oscillators.get_mut(name) {
            Some(osc) => {
                osc.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&BackgroundOscillator> {
        self.oscillators.get(name)
    }

    pub fn len(&self) -> usize {
        self.oscillators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oscillators.is_empty()
    }

    /// name -> enabled
    pub fn enabled_map(&self) -> BTreeMap<String, bool> {
        self.oscillators
            .iter()
            .map(|(name, osc)| (name.clone(), osc.enabled))
            .collect()
    }

    /// Write oscillator output for every parameter `is_owned` rejects.
    /// Disabled oscillators are skipped.
    pub fn apply<F>(&self, now: f64, values: &mut HashMap<String, f64>, is_owned: F)
    where
        F: Fn(&str) -> bool,
    {
        for osc in self.oscillators.values().filter(|o| o.enabled) {
            for (param, value) in osc.sample(now) {
                if !is_owned(param) {
                    values.insert(param.to_string(), value);
                }
            }
        }
    }
}
