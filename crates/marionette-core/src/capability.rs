//! Capability Profile - what the connected host can animate
//!
//! A profile is built once per successful connection and never mutated
//! afterwards. Semantic parameter names used by emotions and background
//! behaviors are resolved against it at dispatch time.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::{ParameterRange, DEFAULT_HOST_PARAMETERS, SEMANTIC_CANDIDATES};

/// Where a profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// Reported by the host
    Discovered,
    /// Built-in fallback
    Default,
}

/// Host capabilities plus the semantic -> host name mapping
#[derive(Debug, Clone)]
pub struct CapabilityProfile {
    pub model_name: String,
    pub available_parameters: BTreeSet<String>,
    pub parameter_ranges: HashMap<String, ParameterRange>,
    pub available_triggers: Vec<String>,
    pub semantic_to_host_map: BTreeMap<String, String>,
    pub source: ProfileSource,
}

impl CapabilityProfile {
    /// Built-in profile used whenever discovery is impossible or fails
    pub fn default_profile() -> Self {
        let parameters: Vec<(String, ParameterRange)> = DEFAULT_HOST_PARAMETERS
            .iter()
            .map(|name| (name.to_string(), ParameterRange::DEFAULT))
            .collect();

        Self::build("Default", parameters, Vec::new(), ProfileSource::Default)
    }

    /// Build a profile from discovery results.
    ///
    /// A host advertising no parameters at all is treated like a failed
    /// discovery and yields the default profile.
    pub fn from_discovery(
        model_name: impl Into<String>,
        parameters: Vec<(String, ParameterRange)>,
        triggers: Vec<String>,
    ) -> Self {
        if parameters.is_empty() {
            return Self::default_profile();
        }
        Self::build(model_name, parameters, triggers, ProfileSource::Discovered)
    }

    fn build(
        model_name: impl Into<String>,
        parameters: Vec<(String, ParameterRange)>,
        triggers: Vec<String>,
        source: ProfileSource,
    ) -> Self {
        let mut available_parameters = BTreeSet::new();
        let mut parameter_ranges = HashMap::new();
        for (name, range) in parameters {
            parameter_ranges.insert(name.clone(), range);
            available_parameters.insert(name);
        }

        let mut profile = CapabilityProfile {
            model_name: model_name.into(),
            available_parameters,
            parameter_ranges,
            available_triggers: triggers,
            semantic_to_host_map: BTreeMap::new(),
            source,
        };
        profile.semantic_to_host_map = profile.adaptive_mapping();
        profile
    }

    /// First advertised candidate wins for each semantic name
    fn adaptive_mapping(&self) -> BTreeMap<String, String> {
        let mut mapping = BTreeMap::new();
        for (semantic, candidates) in SEMANTIC_CANDIDATES {
            if let Some(found) = candidates
                .iter()
                .find(|c| self.available_parameters.contains(**c))
            {
                mapping.insert(semantic.to_string(), found.to_string());
            }
        }
        mapping
    }

    /// Resolve a controller-side name to the host parameter name.
    ///
    /// Semantic names go through the adaptive mapping; a literal host name
    /// the host advertises resolves to itself. Anything else is unmapped.
    pub fn resolve<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some(host) = self.semantic_to_host_map.get(name) {
            return Some(host.as_str());
        }
        if self.available_parameters.contains(name) {
            return Some(name);
        }
        None
    }

    /// Key a controller-side name should be stored under.
    ///
    /// A host name that some semantic name maps onto collapses to that
    /// semantic name, so both spellings drive the same transition and the
    /// same background ownership. Other names are returned unchanged.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        if self.semantic_to_host_map.contains_key(name) {
            return name;
        }
        self.semantic_to_host_map
            .iter()
            .find(|(_, host)| host.as_str() == name)
            .map(|(semantic, _)| semantic.as_str())
            .unwrap_or(name)
    }

    pub fn is_available(&self, host_name: &str) -> bool {
        self.available_parameters.contains(host_name)
    }

    pub fn range_for(&self, host_name: &str) -> ParameterRange {
        self.parameter_ranges
            .get(host_name)
            .copied()
            .unwrap_or(ParameterRange::DEFAULT)
    }

    pub fn clamp(&self, host_name: &str, value: f64) -> f64 {
        self.range_for(host_name).clamp(value)
    }

    pub fn has_trigger(&self, name: &str) -> bool {
        self.available_triggers.iter().any(|t| t == name)
    }

    pub fn mapped_count(&self) -> usize {
        self.semantic_to_host_map.len()
    }

    pub fn is_default(&self) -> bool {
        self.source == ProfileSource::Default
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::default_profile()
    }
}
