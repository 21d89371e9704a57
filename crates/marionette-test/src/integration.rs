//! End-to-end controller scenarios
//!
//! Drives a full `AvatarController` against the scripted host, optionally
//! through the chaos connector, and checks what actually reached the host.

use std::sync::Arc;
use std::time::Duration;

use marionette_runtime::{AvatarController, ControllerConfig};
use marionette_transport::{HostConnector, ScriptedConnector};

use crate::chaos::{ChaosConfig, ChaosConnector};

/// Config with short delays so scenarios finish quickly in paused time
pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        retry_reset_delay_ms: 10,
        backoff_base_ms: 10,
        reconnect_delay_ms: 100,
        reconnect_min_interval_ms: 200,
        ..Default::default()
    }
}

/// A controller wired to an in-memory host
pub struct TestRig {
    pub host: ScriptedConnector,
    pub chaos: Option<ChaosConnector>,
    pub avatar: AvatarController,
}

impl TestRig {
    pub fn new(config: ControllerConfig) -> Self {
        let host = ScriptedConnector::new();
        let avatar = AvatarController::new(config, Arc::new(host.clone()));
        TestRig {
            host,
            chaos: None,
            avatar,
        }
    }

    /// Route every session through a seeded chaos connector
    pub fn with_chaos(config: ControllerConfig, chaos: ChaosConfig, seed: u64) -> Self {
        let host = ScriptedConnector::new();
        let inner: Arc<dyn HostConnector> = Arc::new(host.clone());
        let chaos = ChaosConnector::new(inner, chaos, seed);
        let avatar = AvatarController::new(config, Arc::new(chaos.clone()));
        TestRig {
            host,
            chaos: Some(chaos),
            avatar,
        }
    }

    /// Let the tick loop run for `duration` of (possibly paused) time
    pub async fn run_for(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Every value the host received for `host_name`, oldest first
    pub fn history(&self, host_name: &str) -> Vec<f64> {
        self.host
            .batches()
            .iter()
            .filter_map(|batch| batch.iter().find(|p| p.name == host_name).map(|p| p.value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_core::{EmotionKind, ParameterRange};
    use marionette_runtime::{FallbackTier, SchedulerState};
    use marionette_transport::ParameterInfo;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[tokio::test(start_paused = true)]
    async fn test_fallback_reaches_mock_mode_in_order() {
        let rig = TestRig::new(fast_config());
        rig.host.set_unreachable();

        assert!(rig.avatar.initialize().await);
        let status = rig.avatar.get_status();
        assert_eq!(status.fallback_tier, Some(FallbackTier::MockMode));
        assert!(status.connected);
        assert_eq!(status.model_name, "Default");

        let ports: Vec<u16> = rig.host.connect_attempts().iter().map(|e| e.port).collect();
        assert_eq!(ports, vec![8001, 8001, 8002, 8003, 8080, 9001]);

        rig.run_for(Duration::from_millis(500)).await;
        assert_eq!(rig.host.batch_count(), 0);
        assert!(rig.avatar.get_status().frames > 0);
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tier_means_initialize_false() {
        let rig = TestRig::new(ControllerConfig {
            enable_mock_mode: false,
            enable_emergency_logging: false,
            max_connection_attempts: 2,
            ..fast_config()
        });
        rig.host.set_unreachable();

        assert!(!rig.avatar.initialize().await);
        let status = rig.avatar.get_status();
        assert!(!status.connected);
        assert_eq!(status.scheduler_state, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_scenario_reaches_host() {
        let rig = TestRig::new(fast_config());
        assert!(rig.avatar.initialize().await);

        let mut targets = marionette_core::EmotionTargets::new();
        targets.insert("mouth_smile".into(), 0.8);
        targets.insert("eye_left_open".into(), 0.9);
        rig.avatar.set_emotion_profile(EmotionKind::Happy, targets);

        rig.avatar.set_emotion("happy", 0.8, 2.0, "ease_in_out");
        rig.run_for(Duration::from_millis(2050)).await;

        assert!((rig.host.last_value("MouthSmile").unwrap() - 0.64).abs() < 1e-9);
        assert!((rig.host.last_value("EyeOpenLeft").unwrap() - 0.72).abs() < 1e-9);
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_discovery_runs_on_default_profile() {
        let rig = TestRig::new(fast_config());
        rig.host.set_parameters(Vec::new());

        assert!(rig.avatar.initialize().await);
        rig.run_for(Duration::from_millis(300)).await;

        let status = rig.avatar.get_status();
        assert_eq!(status.scheduler_state, SchedulerState::Running);
        assert_eq!(status.model_name, "Default");
        assert_eq!(status.available_parameters, 11);
        assert!(status.auto_discovery_complete);
        assert!(rig.host.batch_count() > 0);
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_emotion_matches_neutral() {
        let unknown = TestRig::new(fast_config());
        let neutral = TestRig::new(fast_config());
        unknown.avatar.initialize().await;
        neutral.avatar.initialize().await;

        unknown.avatar.set_emotion("does_not_exist", 1.0, 1.0, "linear");
        neutral.avatar.set_emotion("neutral", 1.0, 1.0, "linear");
        tokio::time::sleep(Duration::from_millis(1200)).await;

        for param in ["eye_left_open", "eye_right_open", "mouth_form"] {
            assert_eq!(
                unknown.avatar.current_value(param),
                neutral.avatar.current_value(param),
                "{}",
                param
            );
        }
        assert_eq!(unknown.avatar.get_status().current_emotion, EmotionKind::Neutral);
        unknown.avatar.shutdown().await;
        neutral.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_mid_transition_is_continuous() {
        let rig = TestRig::new(fast_config());
        rig.avatar.initialize().await;

        rig.avatar.set_parameter("face_x", 1.0, 2.0, "linear");
        rig.run_for(Duration::from_millis(1000)).await;
        let before = rig.avatar.current_value("face_x").unwrap();

        rig.avatar.set_parameter("face_x", -1.0, 2.0, "linear");
        rig.run_for(Duration::from_millis(50)).await;
        let after = rig.avatar.current_value("face_x").unwrap();

        // At most two frames of motion, never a jump
        assert!((after - before).abs() < 0.1, "{} -> {}", before, after);
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_owns_parameter_over_oscillator() {
        let rig = TestRig::new(fast_config());
        rig.avatar.initialize().await;
        rig.run_for(Duration::from_millis(200)).await;
        rig.host.clear_events();

        rig.avatar.set_parameter("eyeball_x", 0.9, 3.0, "linear");
        rig.run_for(Duration::from_millis(2900)).await;

        // Oscillator output would swing back and forth; the transition only climbs
        let history = rig.history("EyeballX");
        assert!(history.len() > 40);
        for pair in history.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-12, "{:?}", pair);
        }
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_randomized_targets_stay_in_host_range() {
        let rig = TestRig::new(fast_config());
        rig.host.set_parameters(vec![
            ParameterInfo::new("MouthSmile", 0.0, 1.0),
            ParameterInfo::new("FaceAngleX", -30.0, 30.0),
            ParameterInfo::new("EyeballX", -1.0, 1.0),
            ParameterInfo::new("BrowLeftY", -0.5, 0.5),
        ]);
        rig.avatar.initialize().await;

        let ranges = [
            ("MouthSmile", ParameterRange::new(0.0, 1.0)),
            ("FaceAngleX", ParameterRange::new(-30.0, 30.0)),
            ("EyeballX", ParameterRange::new(-1.0, 1.0)),
            ("BrowLeftY", ParameterRange::new(-0.5, 0.5)),
        ];
        let names = ["mouth_smile", "FaceAngleX", "eyeball_x", "brow_left"];
        let easings = ["linear", "ease_in_out", "ease_in", "ease_out", "bounce"];

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..1000 {
            let name = names[rng.gen_range(0..names.len())];
            let value = rng.gen_range(-100.0..100.0);
            let duration = rng.gen_range(0.0..0.5);
            let easing = easings[rng.gen_range(0..easings.len())];
            rig.avatar.set_parameter(name, value, duration, easing);
            rig.run_for(Duration::from_millis(rng.gen_range(1..60))).await;
        }

        let batches = rig.host.batches();
        assert!(!batches.is_empty());
        for batch in batches {
            for p in batch {
                let (_, range) = ranges.iter().find(|(n, _)| *n == p.name).unwrap();
                assert!(range.contains(p.value), "{} = {}", p.name, p.value);
            }
        }
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_saturation_suppresses_until_initialize() {
        let rig = TestRig::new(ControllerConfig {
            enable_mock_mode: false,
            enable_emergency_logging: false,
            max_connection_attempts: 2,
            ..fast_config()
        });
        assert!(rig.avatar.initialize().await);

        rig.host.set_unreachable();
        rig.host.fail_dispatch(true);
        rig.run_for(Duration::from_secs(5)).await;

        let status = rig.avatar.get_status();
        assert!(!status.connected);
        assert!(status.reconnect_suppressed);
        assert_eq!(status.connection_attempts, 2);
        assert_eq!(status.scheduler_state, SchedulerState::Running);

        // No further attempts once suppressed
        let attempts = rig.host.connect_attempts().len();
        rig.run_for(Duration::from_secs(5)).await;
        assert_eq!(rig.host.connect_attempts().len(), attempts);

        rig.host.set_all_reachable();
        rig.host.fail_dispatch(false);
        assert!(rig.avatar.initialize().await);
        let status = rig.avatar.get_status();
        assert!(status.connected);
        assert!(!status.reconnect_suppressed);
        assert_eq!(status.connection_attempts, 0);
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_swaps_profile_and_drops_stale_transitions() {
        let rig = TestRig::new(fast_config());
        rig.avatar.initialize().await;
        rig.avatar.set_parameter("mouth_smile", 1.0, 30.0, "linear");
        rig.run_for(Duration::from_millis(200)).await;
        assert_eq!(rig.avatar.get_status().active_parameter_count, 1);

        // Host reloads a model without a smile and drops one batch
        rig.host.set_model("NoSmile");
        rig.host.set_parameters(vec![ParameterInfo::new("EyeballX", -1.0, 1.0)]);
        rig.host.fail_dispatch(true);
        rig.run_for(Duration::from_millis(60)).await;
        rig.host.fail_dispatch(false);
        rig.run_for(Duration::from_secs(1)).await;

        let status = rig.avatar.get_status();
        assert!(status.connected);
        assert_eq!(status.model_name, "NoSmile");
        assert_eq!(status.active_parameter_count, 0);
        assert!(status.dispatch_failures >= 1);
        let last = rig.host.last_batch().unwrap();
        assert!(last.iter().all(|p| p.name == "EyeballX"), "{:?}", last);
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_flaky_host() {
        let rig = TestRig::with_chaos(fast_config(), ChaosConfig::flaky(), 11);
        assert!(rig.avatar.initialize().await);
        rig.run_for(Duration::from_secs(10)).await;

        let status = rig.avatar.get_status();
        assert_eq!(status.scheduler_state, SchedulerState::Running);
        assert!(status.frames >= 100, "only {} frames", status.frames);
        if let Some(chaos) = &rig.chaos {
            assert!(chaos.stats().dispatches > 0);
        }
        rig.avatar.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_after_last_dispatch() {
        let rig = TestRig::new(fast_config());
        rig.avatar.initialize().await;
        rig.run_for(Duration::from_millis(300)).await;

        rig.avatar.shutdown().await;
        let events = rig.host.events();
        let close_at = events
            .iter()
            .rposition(|e| matches!(e, marionette_transport::ScriptedEvent::Close))
            .unwrap();
        assert_eq!(close_at, events.len() - 1);

        rig.run_for(Duration::from_millis(300)).await;
        assert_eq!(rig.host.events().len(), events.len());
    }
}
