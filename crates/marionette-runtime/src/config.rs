//! Controller configuration
//!
//! Loaded in three layers, later layers winning:
//! 1. TOML file (`MARIONETTE_CONFIG_PATH`, else `./marionette.toml` if present)
//! 2. Environment variables
//! 3. Explicit overrides (CLI flags, tests)
//!
//! Every field has a default, so a missing file or an empty one is valid.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use marionette_core::{EmotionKind, EmotionTargets, MarionetteError, ParameterRange};
use marionette_motion::BackgroundOscillator;
use marionette_transport::PluginInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "MARIONETTE_CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "marionette.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for MarionetteError {
    fn from(e: ConfigError) -> Self {
        MarionetteError::Config(e.to_string())
    }
}

/// Plugin identity presented to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub name: String,
    pub developer: String,
    pub token_path: Option<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        let info = PluginInfo::default();
        PluginConfig {
            name: info.name,
            developer: info.developer,
            token_path: info.token_path,
        }
    }
}

impl PluginConfig {
    pub fn to_plugin_info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            developer: self.developer.clone(),
            token_path: self.token_path.clone(),
        }
    }
}

/// A background behavior declared in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    pub frequency_hz: f64,
    /// semantic parameter -> [min, max]
    pub parameters: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub phase_offset: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl BehaviorConfig {
    pub fn to_oscillator(&self, name: &str) -> BackgroundOscillator {
        let ranges = self
            .parameters
            .iter()
            .map(|(param, [min, max])| (param.clone(), ParameterRange::new(*min, *max)))
            .collect();
        let mut osc = BackgroundOscillator::new(name, ranges, self.frequency_hz)
            .with_phase_offset(self.phase_offset);
        osc.enabled = self.enabled;
        osc
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub target_fps: u32,
    pub host: String,
    pub default_port: u16,
    pub candidate_ports: Vec<u16>,
    pub max_connection_attempts: u32,
    pub emotion_intensity_multiplier: f64,
    pub auto_emotion_detection: bool,
    pub enable_mock_mode: bool,
    pub enable_emergency_logging: bool,

    pub connect_timeout_ms: u64,
    pub dispatch_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,

    pub backoff_base_ms: u64,
    pub retry_reset_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub reconnect_min_interval_ms: u64,

    pub fps_window: usize,
    pub plugin: PluginConfig,
    pub log_level: String,

    /// Per-emotion overrides of the built-in profile table
    pub emotions: BTreeMap<String, BTreeMap<String, f64>>,
    /// Extra or replacement background behaviors
    pub behaviors: BTreeMap<String, BehaviorConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            target_fps: 20,
            host: "127.0.0.1".to_string(),
            default_port: 8001,
            candidate_ports: vec![8001, 8002, 8003, 8080, 9001],
            max_connection_attempts: 5,
            emotion_intensity_multiplier: 0.8,
            auto_emotion_detection: true,
            enable_mock_mode: true,
            enable_emergency_logging: true,
            connect_timeout_ms: 2000,
            dispatch_timeout_ms: 250,
            shutdown_timeout_ms: 5000,
            backoff_base_ms: 1000,
            retry_reset_delay_ms: 1000,
            reconnect_delay_ms: 1000,
            reconnect_min_interval_ms: 2000,
            fps_window: 60,
            plugin: PluginConfig::default(),
            log_level: "info".to_string(),
            emotions: BTreeMap::new(),
            behaviors: BTreeMap::new(),
        }
    }
}

impl ControllerConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn retry_reset_delay(&self) -> Duration {
        Duration::from_millis(self.retry_reset_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn reconnect_min_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_min_interval_ms)
    }

    /// Emotion overrides parsed into typed kinds
    pub fn emotion_overrides(&self) -> ConfigResult<Vec<(EmotionKind, EmotionTargets)>> {
        self.emotions
            .iter()
            .map(|(name, targets)| {
                EmotionKind::from_name(name)
                    .map(|kind| (kind, targets.clone()))
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown emotion '{}'", name)))
            })
            .collect()
    }

    /// Check ranges and normalize soft limits in place
    pub fn validate(&mut self) -> ConfigResult<()> {
        if !(1..=240).contains(&self.target_fps) {
            return Err(ConfigError::Invalid(format!(
                "target_fps must be within 1..=240, got {}",
                self.target_fps
            )));
        }
        if self.max_connection_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_connection_attempts must be at least 1".into(),
            ));
        }
        if self.fps_window < marionette_motion::MIN_FPS_SAMPLES {
            return Err(ConfigError::Invalid(format!(
                "fps_window must be at least {}, got {}",
                marionette_motion::MIN_FPS_SAMPLES,
                self.fps_window
            )));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if !self.emotion_intensity_multiplier.is_finite() {
            return Err(ConfigError::Invalid(
                "emotion_intensity_multiplier must be finite".into(),
            ));
        }
        self.emotion_intensity_multiplier = self.emotion_intensity_multiplier.clamp(0.0, 2.0);

        self.emotion_overrides()?;

        for (name, behavior) in &self.behaviors {
            if !behavior.frequency_hz.is_finite() || behavior.frequency_hz < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "behavior '{}' has invalid frequency {}",
                    name, behavior.frequency_hz
                )));
            }
        }

        Ok(())
    }
}

/// Locate the configuration file.
///
/// `MARIONETTE_CONFIG_PATH` must point at an existing file when set.
/// Otherwise `./marionette.toml` is used if present, and `None` means
/// defaults apply.
pub fn find_config_file() -> ConfigResult<Option<PathBuf>> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::Invalid(format!(
            "{} points at a missing file: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    Ok(local.exists().then_some(local))
}

/// Load, override and validate the configuration
pub fn load_config(
    config_path: Option<&Path>,
    overrides: Option<&HashMap<String, String>>,
) -> ConfigResult<ControllerConfig> {
    let config_file = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file()?,
    };

    let mut config = match config_file {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)?
        }
        None => ControllerConfig::default(),
    };

    apply_environment_overrides(&mut config);
    if let Some(overrides) = overrides {
        apply_overrides(&mut config, overrides);
    }

    config.validate()?;
    Ok(config)
}

/// Apply overrides from the process environment
///
/// - `MARIONETTE_HOST` -> `host`
/// - `VTUBE_STUDIO_API_PORT` -> `default_port`
/// - `MARIONETTE_TARGET_FPS` -> `target_fps`
/// - `MARIONETTE_LOG_LEVEL` -> `log_level`
/// - `MARIONETTE_MOCK_MODE` -> `enable_mock_mode`
/// - `MARIONETTE_AUTO_EMOTION` -> `auto_emotion_detection`
pub fn apply_environment_overrides(config: &mut ControllerConfig) {
    apply_environment_from(config, |key| env::var(key).ok());
}

pub fn apply_environment_from<F>(config: &mut ControllerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("MARIONETTE_HOST") {
        config.host = value;
    }
    if let Some(value) = lookup("VTUBE_STUDIO_API_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.default_port = port;
        }
    }
    if let Some(value) = lookup("MARIONETTE_TARGET_FPS") {
        if let Ok(fps) = value.parse::<u32>() {
            config.target_fps = fps;
        }
    }
    if let Some(value) = lookup("MARIONETTE_LOG_LEVEL") {
        config.log_level = value;
    }
    if let Some(value) = lookup("MARIONETTE_MOCK_MODE") {
        config.enable_mock_mode = parse_flag(&value);
    }
    if let Some(value) = lookup("MARIONETTE_AUTO_EMOTION") {
        config.auto_emotion_detection = parse_flag(&value);
    }
}

/// Apply explicit key/value overrides (e.g. `{"port": "8002"}`)
pub fn apply_overrides(config: &mut ControllerConfig, overrides: &HashMap<String, String>) {
    if let Some(value) = overrides.get("host") {
        config.host = value.clone();
    }
    if let Some(value) = overrides.get("port") {
        if let Ok(port) = value.parse::<u16>() {
            config.default_port = port;
        }
    }
    if let Some(value) = overrides.get("target_fps") {
        if let Ok(fps) = value.parse::<u32>() {
            config.target_fps = fps;
        }
    }
    if let Some(value) = overrides.get("log_level") {
        config.log_level = value.clone();
    }
    if let Some(value) = overrides.get("mock_mode") {
        config.enable_mock_mode = parse_flag(value);
    }
    if let Some(value) = overrides.get("max_connection_attempts") {
        if let Ok(attempts) = value.parse::<u32>() {
            config.max_connection_attempts = attempts;
        }
    }
    if let Some(value) = overrides.get("emotion_intensity_multiplier") {
        if let Ok(m) = value.parse::<f64>() {
            config.emotion_intensity_multiplier = m;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        let mut config = ControllerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frame_period(), Duration::from_millis(50));
        assert_eq!(config.candidate_ports, vec![8001, 8002, 8003, 8080, 9001]);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("marionette.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "target_fps = 30").unwrap();
        writeln!(file, "default_port = 9100").unwrap();
        writeln!(file, "[plugin]").unwrap();
        writeln!(file, "name = \"Stage Puppet\"").unwrap();
        writeln!(file, "[emotions.happy]").unwrap();
        writeln!(file, "mouth_smile = 0.5").unwrap();
        writeln!(file, "[behaviors.nod]").unwrap();
        writeln!(file, "frequency_hz = 0.5").unwrap();
        writeln!(file, "parameters = {{ face_y = [-0.1, 0.1] }}").unwrap();
        drop(file);

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.default_port, 9100);
        assert_eq!(config.plugin.name, "Stage Puppet");
        assert_eq!(config.plugin.developer, PluginConfig::default().developer);
        assert_eq!(config.max_connection_attempts, 5);

        let overrides = config.emotion_overrides().unwrap();
        assert_eq!(overrides[0].0, EmotionKind::Happy);

        let nod = config.behaviors["nod"].to_oscillator("nod");
        assert!(nod.enabled);
        assert_eq!(nod.parameter_ranges["face_y"], ParameterRange::new(-0.1, 0.1));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "target_fps = \"fast\"").unwrap();
        assert!(matches!(
            load_config(Some(&path), None),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_error_converts_to_controller_error() {
        let err: MarionetteError = ConfigError::Invalid("target_fps must be 1..=240".into()).into();
        assert!(matches!(err, MarionetteError::Config(ref msg) if msg.contains("target_fps")));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(load_config(Some(&path), None), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut config = ControllerConfig {
            target_fps: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ControllerConfig {
            max_connection_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = ControllerConfig {
            fps_window: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.emotions.insert("grumpy".into(), BTreeMap::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiplier_is_clamped() {
        let mut config = ControllerConfig {
            emotion_intensity_multiplier: 3.5,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.emotion_intensity_multiplier, 2.0);
    }

    #[test]
    fn test_environment_then_explicit_overrides() {
        let mut config = ControllerConfig::default();
        let env: HashMap<&str, &str> = [
            ("VTUBE_STUDIO_API_PORT", "8123"),
            ("MARIONETTE_HOST", "studio.local"),
            ("MARIONETTE_MOCK_MODE", "false"),
            ("MARIONETTE_TARGET_FPS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        apply_environment_from(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.default_port, 8123);
        assert_eq!(config.host, "studio.local");
        assert!(!config.enable_mock_mode);
        assert_eq!(config.target_fps, 20);

        let explicit: HashMap<String, String> =
            [("port".to_string(), "8002".to_string())].into_iter().collect();
        apply_overrides(&mut config, &explicit);
        assert_eq!(config.default_port, 8002);
    }
}
