//! Avatar controller - the public handle
//!
//! Owns the animation state, the connection supervisor and the tick loop.
//! The handle is cheap to clone; every clone drives the same avatar.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use marionette_core::{
    detect_from_text, CapabilityProfile, EmotionKind, EmotionTargets, MarionetteError,
    ParameterRange,
};
use marionette_motion::{EasingKind, FrameTimer};
use marionette_transport::HostConnector;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::clock::SessionClock;
use crate::config::ControllerConfig;
use crate::director::{
    apply_emotion, apply_parameter, resolve_emotion, speech_intensity, SPEECH_PAUSE,
    SPEECH_TRANSITION_SECS,
};
use crate::scheduler::{compute_frame, AnimationState, FrameBatch, SchedulerState};
use crate::supervisor::{ConnectionSupervisor, FallbackTier};

/// Snapshot of everything observable about the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub connected: bool,
    pub fallback_tier: Option<FallbackTier>,
    pub fps: f64,
    pub target_fps: u32,
    pub model_name: String,
    pub available_parameters: usize,
    pub mapped_parameters: usize,
    pub active_parameter_count: usize,
    pub background_behaviors: BTreeMap<String, bool>,
    pub current_emotion: EmotionKind,
    pub emotion_intensity: f64,
    pub connection_attempts: u32,
    pub reconnect_suppressed: bool,
    pub auto_discovery_complete: bool,
    pub scheduler_state: SchedulerState,
    pub frames: u64,
    pub dispatch_failures: u64,
    pub auto_emotion_detection: bool,
    pub emotion_intensity_multiplier: f64,
    pub last_error: Option<String>,
}

impl ControllerStatus {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

struct ControllerInner {
    config: ControllerConfig,
    clock: SessionClock,
    animation: Mutex<AnimationState>,
    supervisor: Arc<ConnectionSupervisor>,
    scheduler_state: RwLock<SchedulerState>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    timer: Mutex<FrameTimer>,
    frames: AtomicU64,
}

#[derive(Clone)]
pub struct AvatarController {
    inner: Arc<ControllerInner>,
}

impl AvatarController {
    pub fn new(config: ControllerConfig, connector: Arc<dyn HostConnector>) -> Self {
        let mut animation = AnimationState::new(
            config.emotion_intensity_multiplier.clamp(0.0, 2.0),
            config.auto_emotion_detection,
        );

        match config.emotion_overrides() {
            Ok(overrides) => {
                for (kind, targets) in overrides {
                    animation.emotions.set(kind, targets);
                }
            }
            Err(e) => warn!("Ignoring emotion overrides: {}", MarionetteError::from(e)),
        }
        let startup_profile = CapabilityProfile::default_profile();
        for (name, behavior) in &config.behaviors {
            let mut osc = behavior.to_oscillator(name);
            osc.parameter_ranges =
                canonical_ranges(&startup_profile, std::mem::take(&mut osc.parameter_ranges));
            animation.background.insert(osc);
        }

        let (shutdown_tx, _) = watch::channel(false);
        let timer = FrameTimer::new(config.fps_window);
        let supervisor = Arc::new(ConnectionSupervisor::new(config.clone(), connector));

        AvatarController {
            inner: Arc::new(ControllerInner {
                config,
                clock: SessionClock::new(),
                animation: Mutex::new(animation),
                supervisor,
                scheduler_state: RwLock::new(SchedulerState::Idle),
                running: AtomicBool::new(false),
                shutdown_tx,
                loop_handle: tokio::sync::Mutex::new(None),
                timer: Mutex::new(timer),
                frames: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Session time in seconds
    pub fn now(&self) -> f64 {
        self.inner.clock.now()
    }

    /// Connect through the fallback tiers, discover the host and start the
    /// tick loop. Calling it again re-runs the tier search and resets the
    /// reconnect budget.
    pub async fn initialize(&self) -> bool {
        if *self.inner.scheduler_state.read() == SchedulerState::ShutDown {
            warn!("{}", MarionetteError::AlreadyShutDown);
            return false;
        }

        let tier = match self.inner.supervisor.initialize().await {
            Ok(tier) => tier,
            Err(e) => {
                warn!("Initialization failed: {}", e);
                return false;
            }
        };

        // Shutdown flips state under this lock
        let mut handle = self.inner.loop_handle.lock().await;
        if *self.inner.scheduler_state.read() == SchedulerState::ShutDown {
            drop(handle);
            warn!("Shut down while connecting, closing {}", tier);
            self.inner.supervisor.close().await;
            return false;
        }
        if handle.is_none() {
            self.inner.running.store(true, Ordering::Release);
            *self.inner.scheduler_state.write() = SchedulerState::Running;
            let inner = Arc::clone(&self.inner);
            let shutdown = self.inner.shutdown_tx.subscribe();
            *handle = Some(tokio::spawn(run_loop(inner, shutdown)));
        }

        info!(
            "Avatar controller running at {} FPS via {}",
            self.inner.config.target_fps, tier
        );
        true
    }

    /// Set an emotion by name. Unknown names fall back to neutral.
    pub fn set_emotion(&self, emotion: &str, intensity: f64, duration: f64, easing: &str) -> bool {
        let kind = resolve_emotion(emotion);
        self.set_emotion_kind(kind, intensity, duration, EasingKind::parse(easing))
    }

    pub fn set_emotion_kind(
        &self,
        kind: EmotionKind,
        intensity: f64,
        duration: f64,
        easing: EasingKind,
    ) -> bool {
        let now = self.now();
        let (profile, _) = self.inner.supervisor.profile();
        apply_emotion(
            &mut self.inner.animation.lock(),
            &profile,
            kind,
            intensity,
            duration,
            easing,
            now,
        )
    }

    /// Detect emotions in `text` and play them one after another.
    ///
    /// Returns the kinds applied; empty when automatic detection is off.
    pub async fn detect_and_apply_speech(&self, text: &str, intensity: f64) -> Vec<EmotionKind> {
        let scaled = {
            let animation = self.inner.animation.lock();
            speech_intensity(&animation, intensity)
        };
        let Some(scaled) = scaled else {
            debug!("Automatic emotion detection is off");
            return Vec::new();
        };

        let kinds = detect_from_text(text);
        for kind in &kinds {
            self.set_emotion_kind(*kind, scaled, SPEECH_TRANSITION_SECS, EasingKind::EaseInOut);
            sleep(SPEECH_PAUSE).await;
        }
        kinds
    }

    /// Ease one parameter toward `value`. Accepts semantic or host names.
    pub fn set_parameter(&self, name: &str, value: f64, duration: f64, easing: &str) -> bool {
        let now = self.now();
        let (profile, _) = self.inner.supervisor.profile();
        apply_parameter(
            &mut self.inner.animation.lock(),
            &profile,
            name,
            value,
            duration,
            EasingKind::parse(easing),
            now,
        )
    }

    pub fn set_background_behavior(&self, name: &str, enabled: bool) -> bool {
        let found = self.inner.animation.lock().background.set_enabled(name, enabled);
        if found {
            info!(
                "Background behavior '{}': {}",
                name,
                if enabled { "enabled" } else { "disabled" }
            );
        } else {
            warn!("{}", MarionetteError::UnknownBehavior(name.to_string()));
        }
        found
    }

    /// Add or replace a background behavior. Host parameter names are
    /// stored under their semantic key like every other command.
    pub fn register_behavior(
        &self,
        name: &str,
        parameter_ranges: BTreeMap<String, ParameterRange>,
        frequency_hz: f64,
    ) {
        let (profile, _) = self.inner.supervisor.profile();
        let ranges = canonical_ranges(&profile, parameter_ranges);
        self.inner
            .animation
            .lock()
            .background
            .register(name, ranges, frequency_hz);
    }

    pub fn set_emotion_profile(&self, kind: EmotionKind, targets: EmotionTargets) {
        self.inner.animation.lock().emotions.set(kind, targets);
    }

    /// Clamped to `[0, 2]`; non-finite values are ignored
    pub fn set_emotion_intensity_multiplier(&self, multiplier: f64) {
        if multiplier.is_finite() {
            self.inner.animation.lock().emotion_intensity_multiplier = multiplier.clamp(0.0, 2.0);
        }
    }

    pub fn set_auto_emotion_detection(&self, enabled: bool) {
        self.inner.animation.lock().auto_emotion_detection = enabled;
    }

    /// Fire a host trigger (hotkey). Offline tiers only log it.
    pub async fn trigger(&self, name: &str) -> bool {
        match self.inner.supervisor.trigger(name).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Trigger '{}' failed: {}", name, e);
                false
            }
        }
    }

    pub fn current_value(&self, name: &str) -> Option<f64> {
        let (profile, _) = self.inner.supervisor.profile();
        let key = profile.canonical_name(name);
        self.inner.animation.lock().current_values.get(key).copied()
    }

    pub fn current_values(&self) -> BTreeMap<String, f64> {
        self.inner
            .animation
            .lock()
            .current_values
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn get_status(&self) -> ControllerStatus {
        let connection = self.inner.supervisor.state();
        let (profile, _) = self.inner.supervisor.profile();
        let animation = self.inner.animation.lock();

        ControllerStatus {
            connected: connection.connected,
            fallback_tier: connection.fallback_tier,
            fps: self.inner.timer.lock().fps(),
            target_fps: self.inner.config.target_fps,
            model_name: profile.model_name.clone(),
            available_parameters: profile.available_parameters.len(),
            mapped_parameters: profile.mapped_count(),
            active_parameter_count: animation.transitions.len(),
            background_behaviors: animation.background.enabled_map(),
            current_emotion: animation.current_emotion,
            emotion_intensity: animation.emotion_intensity,
            connection_attempts: connection.connection_attempts,
            reconnect_suppressed: connection.reconnect_suppressed,
            auto_discovery_complete: self.inner.supervisor.auto_discovery_complete(),
            scheduler_state: *self.inner.scheduler_state.read(),
            frames: self.inner.frames.load(Ordering::Relaxed),
            dispatch_failures: self.inner.supervisor.dispatch_failures(),
            auto_emotion_detection: animation.auto_emotion_detection,
            emotion_intensity_multiplier: animation.emotion_intensity_multiplier,
            last_error: connection.last_error,
        }
    }

    /// Stop the tick loop, then close the host connection. Idempotent.
    pub async fn shutdown(&self) {
        let handle = {
            let mut slot = self.inner.loop_handle.lock().await;
            {
                let mut state = self.inner.scheduler_state.write();
                if *state == SchedulerState::ShutDown {
                    return;
                }
                *state = SchedulerState::ShutDown;
            }
            self.inner.running.store(false, Ordering::Release);
            let _ = self.inner.shutdown_tx.send(true);
            slot.take()
        };

        if let Some(mut handle) = handle {
            if timeout(self.inner.config.shutdown_timeout(), &mut handle)
                .await
                .is_err()
            {
                warn!("Tick loop did not stop in time, aborting it");
                handle.abort();
            }
        }

        self.inner.supervisor.close().await;
        info!("Avatar controller shut down");
    }
}

impl ControllerInner {
    /// One frame: compute, then dispatch or ask for a reconnect
    async fn tick(&self) -> FrameBatch {
        let now = self.clock.now();
        let (profile, generation) = self.supervisor.profile();
        let batch = {
            let mut animation = self.animation.lock();
            compute_frame(&mut animation, now, &profile, generation)
        };
        self.frames.fetch_add(1, Ordering::Relaxed);

        if !self.supervisor.is_connected() {
            self.supervisor.schedule_reconnect();
            return batch;
        }

        if let Err(e) = self.supervisor.dispatch(&batch.values).await {
            if e.is_recoverable() {
                warn!("{}", e);
            } else {
                error!("{}", e);
            }
            self.supervisor.schedule_reconnect();
        }
        batch
    }
}

/// Re-key behavior ranges so host names share keys with semantic names
fn canonical_ranges(
    profile: &CapabilityProfile,
    ranges: BTreeMap<String, ParameterRange>,
) -> BTreeMap<String, ParameterRange> {
    ranges
        .into_iter()
        .map(|(name, range)| (profile.canonical_name(&name).to_string(), range))
        .collect()
}

async fn run_loop(inner: Arc<ControllerInner>, mut shutdown: watch::Receiver<bool>) {
    let period = inner.config.frame_period();
    let mut last_tick: Option<Instant> = None;

    while inner.running.load(Ordering::Acquire) {
        let tick_start = Instant::now();
        if let Some(previous) = last_tick {
            inner.timer.lock().record(tick_start - previous);
        }
        last_tick = Some(tick_start);

        inner.tick().await;

        // Late frames are delayed, never made up with a burst
        let remaining = period.saturating_sub(tick_start.elapsed());
        tokio::select! {
            _ = sleep(remaining) => {}
            _ = shutdown.changed() => {}
        }
    }

    debug!("Tick loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_transport::{ScriptedConnector, ScriptedEvent};
    use std::time::Duration;

    fn controller(host: &ScriptedConnector) -> AvatarController {
        AvatarController::new(ControllerConfig::default(), Arc::new(host.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_scenario_values() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        assert!(avatar.initialize().await);

        avatar.set_emotion("happy", 0.8, 2.0, "ease_in_out");
        sleep(Duration::from_millis(2100)).await;

        assert!((avatar.current_value("mouth_smile").unwrap() - 0.64).abs() < 1e-9);
        assert!((avatar.current_value("eye_left_open").unwrap() - 0.72).abs() < 1e-9);
        assert!((host.last_value("MouthSmile").unwrap() - 0.64).abs() < 1e-9);
        assert!((host.last_value("EyeOpenLeft").unwrap() - 0.72).abs() < 1e-9);

        let status = avatar.get_status();
        assert_eq!(status.current_emotion, EmotionKind::Happy);
        assert_eq!(status.scheduler_state, SchedulerState::Running);
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fps_reported_after_window_fills() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.initialize().await;

        sleep(Duration::from_millis(200)).await;
        assert_eq!(avatar.get_status().fps, 0.0);

        sleep(Duration::from_secs(2)).await;
        let status = avatar.get_status();
        assert!((status.fps - 20.0).abs() < 0.5, "fps was {}", status.fps);
        assert!(status.frames >= 40);
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_detection_applies_in_order() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.initialize().await;

        let kinds = avatar
            .detect_and_apply_speech("I'm so happy but a little tired", 0.8)
            .await;
        assert_eq!(kinds, vec![EmotionKind::Happy, EmotionKind::Sleepy]);
        assert_eq!(avatar.get_status().current_emotion, EmotionKind::Sleepy);

        avatar.set_auto_emotion_detection(false);
        assert!(avatar.detect_and_apply_speech("happy", 0.8).await.is_empty());
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop_before_close() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.initialize().await;
        sleep(Duration::from_millis(500)).await;

        avatar.shutdown().await;
        let events = host.events();
        assert_eq!(events.last(), Some(&ScriptedEvent::Close));

        let batches = host.batch_count();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(host.batch_count(), batches);
        assert_eq!(avatar.get_status().scheduler_state, SchedulerState::ShutDown);

        // Cannot be restarted
        assert!(!avatar.initialize().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_connect_leaves_nothing_running() {
        let host = ScriptedConnector::new();
        host.set_reachable_ports(&[8080]);
        let avatar = controller(&host);

        let connecting = {
            let avatar = avatar.clone();
            tokio::spawn(async move { avatar.initialize().await })
        };
        sleep(Duration::from_millis(100)).await;
        avatar.shutdown().await;

        assert!(!connecting.await.unwrap());
        sleep(Duration::from_secs(1)).await;

        let status = avatar.get_status();
        assert_eq!(status.scheduler_state, SchedulerState::ShutDown);
        assert!(!status.connected);
        assert_eq!(status.frames, 0);
        assert_eq!(host.batch_count(), 0);
        // The session found on 8080 was closed, not leaked
        assert_eq!(host.close_count(), 1);
        assert_eq!(host.events().last(), Some(&ScriptedEvent::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_name_transition_is_not_overridden_by_oscillator() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.initialize().await;
        sleep(Duration::from_millis(200)).await;
        host.clear_events();

        avatar.set_parameter("EyeballX", 0.9, 3.0, "linear");
        sleep(Duration::from_millis(2900)).await;

        let history: Vec<f64> = host
            .batches()
            .iter()
            .filter_map(|b| b.iter().find(|p| p.name == "EyeballX").map(|p| p.value))
            .collect();
        assert!(history.len() > 40);
        for pair in history.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-12, "{:?}", pair);
        }
        assert!(*history.last().unwrap() > 0.8);
        assert_eq!(avatar.current_value("EyeballX"), avatar.current_value("eyeball_x"));
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_command_wins_across_name_spellings() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.initialize().await;

        avatar.set_emotion("happy", 0.8, 0.0, "linear");
        sleep(Duration::from_millis(100)).await;
        assert!((host.last_value("MouthSmile").unwrap() - 0.64).abs() < 1e-9);

        avatar.set_parameter("MouthSmile", 0.1, 0.0, "linear");
        sleep(Duration::from_millis(100)).await;
        assert_eq!(host.last_value("MouthSmile"), Some(0.1));
        assert_eq!(avatar.current_value("mouth_smile"), Some(0.1));
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_registered_behavior_with_host_names_yields_to_transitions() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.initialize().await;

        let ranges = [("FacePositionY".to_string(), ParameterRange::new(-0.5, 0.5))]
            .into_iter()
            .collect();
        avatar.register_behavior("bob", ranges, 1.0);
        sleep(Duration::from_millis(300)).await;
        assert!(avatar.get_status().background_behaviors["bob"]);

        host.clear_events();
        avatar.set_parameter("face_y", 0.25, 10.0, "linear");
        sleep(Duration::from_secs(2)).await;

        // A 1 Hz bob would reverse direction; the transition moves one way
        let history: Vec<f64> = host
            .batches()
            .iter()
            .filter_map(|b| b.iter().find(|p| p.name == "FacePositionY").map(|p| p.value))
            .collect();
        assert!(history.len() > 30);
        let direction = (0.25 - history[0]).signum();
        for pair in history.windows(2) {
            assert!((pair[1] - pair[0]) * direction >= -1e-12, "{:?}", pair);
        }
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_behavior_toggles_and_trigger() {
        let host = ScriptedConnector::new();
        host.set_triggers(&["Wave"]);
        let avatar = controller(&host);
        avatar.initialize().await;

        assert!(avatar.set_background_behavior("breathing", false));
        assert!(!avatar.set_background_behavior("juggling", true));
        assert!(!avatar.get_status().background_behaviors["breathing"]);

        assert!(avatar.trigger("Wave").await);
        assert!(!avatar.trigger("Moonwalk").await);
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_serializes() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.initialize().await;

        let json: serde_json::Value = serde_json::from_str(&avatar.get_status().to_json()).unwrap();
        assert_eq!(json["fallback_tier"], "direct_connection");
        assert_eq!(json["scheduler_state"], "running");
        assert_eq!(json["current_emotion"], "neutral");
        assert_eq!(json["model_name"], "Scripted");
        avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiplier_clamped() {
        let host = ScriptedConnector::new();
        let avatar = controller(&host);
        avatar.set_emotion_intensity_multiplier(5.0);
        assert_eq!(avatar.get_status().emotion_intensity_multiplier, 2.0);
        avatar.set_emotion_intensity_multiplier(f64::NAN);
        assert_eq!(avatar.get_status().emotion_intensity_multiplier, 2.0);
    }
}
