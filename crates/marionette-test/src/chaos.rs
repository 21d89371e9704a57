//! Chaos host for controller testing
//!
//! Wraps any `HostConnector` and makes it misbehave on a seeded schedule:
//! - Refused connections
//! - Dispatch failures, in bursts
//! - Dispatch latency with jitter

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marionette_core::ParameterValue;
use marionette_transport::{
    Endpoint, HostConnector, HostSession, ModelInfo, ParameterInfo, TransportError,
    TransportResult, TriggerInfo,
};
use parking_lot::Mutex;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Jitter distribution type
#[derive(Clone, Debug)]
pub enum JitterDistribution {
    None,
    Uniform { min_ms: u32, max_ms: u32 },
    /// Heavy tail, capped at one second
    Pareto { scale_ms: f64, shape: f64 },
}

impl JitterDistribution {
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            JitterDistribution::None => Duration::ZERO,
            JitterDistribution::Uniform { min_ms, max_ms } => {
                if max_ms <= min_ms {
                    return Duration::from_millis(*min_ms as u64);
                }
                let dist = Uniform::new(*min_ms, *max_ms);
                Duration::from_millis(dist.sample(rng) as u64)
            }
            JitterDistribution::Pareto { scale_ms, shape } => {
                let u: f64 = rng.gen::<f64>().max(f64::EPSILON);
                let value = scale_ms / u.powf(1.0 / shape);
                Duration::from_millis(value.min(1000.0) as u64)
            }
        }
    }
}

/// Host misbehavior profile
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Added to every dispatch
    pub base_latency: Duration,
    pub jitter: JitterDistribution,
    /// Probability a connect is refused (0.0 - 1.0)
    pub connect_failure_rate: f64,
    /// Probability a dispatch fails (0.0 - 1.0)
    pub dispatch_failure_rate: f64,
    /// Probability a failure starts a burst
    pub burst_failure_prob: f64,
    /// Burst length range
    pub burst_length: (u32, u32),
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(5),
            jitter: JitterDistribution::Uniform { min_ms: 0, max_ms: 10 },
            connect_failure_rate: 0.0,
            dispatch_failure_rate: 0.01,
            burst_failure_prob: 0.1,
            burst_length: (2, 5),
        }
    }
}

impl ChaosConfig {
    /// Well-behaved host
    pub fn calm() -> Self {
        ChaosConfig {
            base_latency: Duration::ZERO,
            jitter: JitterDistribution::None,
            connect_failure_rate: 0.0,
            dispatch_failure_rate: 0.0,
            burst_failure_prob: 0.0,
            burst_length: (1, 1),
        }
    }

    /// Occasionally drops batches
    pub fn flaky() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(20),
            jitter: JitterDistribution::Uniform { min_ms: 0, max_ms: 40 },
            connect_failure_rate: 0.2,
            dispatch_failure_rate: 0.1,
            burst_failure_prob: 0.2,
            burst_length: (2, 6),
        }
    }

    /// Overloaded host; latency regularly exceeds the dispatch timeout
    pub fn hostile() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(150),
            jitter: JitterDistribution::Pareto {
                scale_ms: 50.0,
                shape: 1.2,
            },
            connect_failure_rate: 0.5,
            dispatch_failure_rate: 0.3,
            burst_failure_prob: 0.4,
            burst_length: (5, 15),
        }
    }
}

/// Chaos statistics
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChaosStats {
    pub connects: u64,
    pub connects_refused: u64,
    pub dispatches: u64,
    pub dispatches_failed: u64,
    pub total_latency_ms: u64,
}

impl ChaosStats {
    pub fn dispatch_failure_rate(&self) -> f64 {
        if self.dispatches == 0 {
            0.0
        } else {
            self.dispatches_failed as f64 / self.dispatches as f64
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.dispatches == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.dispatches as f64
        }
    }
}

struct ChaosCore {
    config: ChaosConfig,
    rng: StdRng,
    burst_remaining: u32,
    stats: ChaosStats,
}

impl ChaosCore {
    fn refuse_connect(&mut self) -> bool {
        self.stats.connects += 1;
        let refused = self.rng.gen::<f64>() < self.config.connect_failure_rate;
        if refused {
            self.stats.connects_refused += 1;
        }
        refused
    }

    /// Decide latency and fate of one dispatch
    fn plan_dispatch(&mut self) -> (Duration, bool) {
        self.stats.dispatches += 1;
        let latency = self.config.base_latency + self.config.jitter.sample(&mut self.rng);
        self.stats.total_latency_ms += latency.as_millis() as u64;

        let fail = if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            true
        } else if self.rng.gen::<f64>() < self.config.dispatch_failure_rate {
            if self.rng.gen::<f64>() < self.config.burst_failure_prob {
                let (min, max) = self.config.burst_length;
                self.burst_remaining = self.rng.gen_range(min..=max.max(min)).saturating_sub(1);
            }
            true
        } else {
            false
        };

        if fail {
            self.stats.dispatches_failed += 1;
        }
        (latency, fail)
    }
}

/// Connector that injects seeded failures and latency into another one
#[derive(Clone)]
pub struct ChaosConnector {
    inner: Arc<dyn HostConnector>,
    core: Arc<Mutex<ChaosCore>>,
}

impl ChaosConnector {
    pub fn new(inner: Arc<dyn HostConnector>, config: ChaosConfig, seed: u64) -> Self {
        ChaosConnector {
            inner,
            core: Arc::new(Mutex::new(ChaosCore {
                config,
                rng: StdRng::seed_from_u64(seed),
                burst_remaining: 0,
                stats: ChaosStats::default(),
            })),
        }
    }

    pub fn stats(&self) -> ChaosStats {
        self.core.lock().stats.clone()
    }

    /// Swap the misbehavior profile mid-run
    pub fn set_config(&self, config: ChaosConfig) {
        let mut core = self.core.lock();
        core.config = config;
        core.burst_remaining = 0;
    }
}

#[async_trait]
impl HostConnector for ChaosConnector {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn HostSession>> {
        if self.core.lock().refuse_connect() {
            return Err(TransportError::ConnectFailed(format!(
                "chaos refused {}",
                endpoint
            )));
        }
        let inner = self.inner.connect(endpoint).await?;
        Ok(Box::new(ChaosSession {
            inner,
            core: Arc::clone(&self.core),
        }))
    }

    fn kind(&self) -> &str {
        "chaos"
    }
}

struct ChaosSession {
    inner: Box<dyn HostSession>,
    core: Arc<Mutex<ChaosCore>>,
}

#[async_trait]
impl HostSession for ChaosSession {
    async fn authenticate(&mut self) -> TransportResult<()> {
        self.inner.authenticate().await
    }

    async fn current_model(&mut self) -> TransportResult<ModelInfo> {
        self.inner.current_model().await
    }

    async fn list_parameters(&mut self) -> TransportResult<Vec<ParameterInfo>> {
        self.inner.list_parameters().await
    }

    async fn list_triggers(&mut self) -> TransportResult<Vec<TriggerInfo>> {
        self.inner.list_triggers().await
    }

    async fn set_parameters(&mut self, batch: &[ParameterValue]) -> TransportResult<()> {
        let (latency, fail) = self.core.lock().plan_dispatch();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(TransportError::Closed);
        }
        self.inner.set_parameters(batch).await
    }

    async fn trigger(&mut self, name: &str) -> TransportResult<()> {
        self.inner.trigger(name).await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.inner.close().await
    }

    fn endpoint(&self) -> &Endpoint {
        self.inner.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_transport::ScriptedConnector;

    fn chaos(config: ChaosConfig, seed: u64) -> (ScriptedConnector, ChaosConnector) {
        let host = ScriptedConnector::new();
        let chaos = ChaosConnector::new(Arc::new(host.clone()), config, seed);
        (host, chaos)
    }

    /// Keep connecting until the chaos host lets one through
    async fn connect_through(chaos: &ChaosConnector) -> Box<dyn HostSession> {
        let endpoint = Endpoint::new("127.0.0.1", 8001);
        for _ in 0..64 {
            if let Ok(session) = chaos.connect(&endpoint).await {
                return session;
            }
        }
        panic!("chaos host refused 64 connects in a row");
    }

    async fn run_dispatches(chaos: &ChaosConnector, n: usize) -> usize {
        let mut session = connect_through(chaos).await;
        let mut ok = 0;
        for i in 0..n {
            let batch = [ParameterValue::new("EyeballX", i as f64 / n as f64)];
            if session.set_parameters(&batch).await.is_ok() {
                ok += 1;
            }
        }
        ok
    }

    #[tokio::test(start_paused = true)]
    async fn test_calm_passes_everything() {
        let (host, chaos) = chaos(ChaosConfig::calm(), 7);
        assert_eq!(run_dispatches(&chaos, 100).await, 100);
        assert_eq!(host.batch_count(), 100);
        assert_eq!(chaos.stats().dispatches_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_failures() {
        let (_, a) = chaos(ChaosConfig::flaky(), 42);
        let (_, b) = chaos(ChaosConfig::flaky(), 42);
        run_dispatches(&a, 200).await;
        run_dispatches(&b, 200).await;
        assert_eq!(a.stats(), b.stats());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hostile_fails_more_than_flaky() {
        let (_, flaky) = chaos(ChaosConfig::flaky(), 3);
        let (_, hostile) = chaos(ChaosConfig::hostile(), 3);
        run_dispatches(&flaky, 300).await;
        run_dispatches(&hostile, 300).await;

        let flaky = flaky.stats();
        let hostile = hostile.stats();
        assert!(hostile.dispatch_failure_rate() > flaky.dispatch_failure_rate());
        assert!(hostile.avg_latency_ms() > flaky.avg_latency_ms());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hostile_refusals_are_counted() {
        let (host, chaos) = chaos(ChaosConfig::hostile(), 3);
        run_dispatches(&chaos, 10).await;

        let stats = chaos.stats();
        assert!(stats.connects >= 1);
        assert_eq!(stats.connects - stats.connects_refused, 1);
        assert_eq!(host.connect_attempts().len(), 1);
    }

    #[test]
    fn test_uniform_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let jitter = JitterDistribution::Uniform { min_ms: 10, max_ms: 20 };
        for _ in 0..1000 {
            let d = jitter.sample(&mut rng);
            assert!(d >= Duration::from_millis(10) && d < Duration::from_millis(20));
        }
    }
}
