//! Connection supervisor
//!
//! Owns the host session and walks an ordered list of fallback tiers until
//! one works. After a network tier connects, the host's capabilities are
//! discovered and installed as a fresh `CapabilityProfile`.
//!
//! Tier order:
//! 1. DirectConnection  - configured host and default port
//! 2. RetryWithReset    - drop any half-open session, wait, try direct again
//! 3. AlternativePorts  - every candidate port in turn
//! 4. MockMode          - simulated host, batches are logged
//! 5. EmergencyLogging  - last resort, batches are logged

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marionette_core::{
    CapabilityProfile, MarionetteError, MarionetteResult, ParameterRange, ParameterValue,
};
use marionette_transport::{
    Endpoint, HostConnector, HostSession, TransportError, TransportResult,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    DirectConnection,
    RetryWithReset,
    AlternativePorts,
    MockMode,
    EmergencyLogging,
}

impl FallbackTier {
    pub const ALL: [FallbackTier; 5] = [
        FallbackTier::DirectConnection,
        FallbackTier::RetryWithReset,
        FallbackTier::AlternativePorts,
        FallbackTier::MockMode,
        FallbackTier::EmergencyLogging,
    ];

    /// Tiers that talk to a real host
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FallbackTier::DirectConnection
                | FallbackTier::RetryWithReset
                | FallbackTier::AlternativePorts
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackTier::DirectConnection => "direct_connection",
            FallbackTier::RetryWithReset => "retry_with_reset",
            FallbackTier::AlternativePorts => "alternative_ports",
            FallbackTier::MockMode => "mock_mode",
            FallbackTier::EmergencyLogging => "emergency_logging",
        }
    }
}

impl fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection bookkeeping; only the supervisor writes it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub fallback_tier: Option<FallbackTier>,
    pub connection_attempts: u32,
    pub reconnect_suppressed: bool,
    pub last_error: Option<String>,
}

/// What happened to one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered to the host
    Sent,
    /// Offline tier; recorded in the log only
    Logged,
    /// Nothing to send to
    Skipped,
}

pub struct ConnectionSupervisor {
    config: ControllerConfig,
    connector: Arc<dyn HostConnector>,
    session: tokio::sync::Mutex<Option<Box<dyn HostSession>>>,
    state: RwLock<ConnectionState>,
    profile: RwLock<Arc<CapabilityProfile>>,
    generation: AtomicU64,
    auto_discovery_complete: AtomicBool,
    reconnect_in_flight: AtomicBool,
    last_reconnect: Mutex<Option<Instant>>,
    dispatch_failures: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionSupervisor {
    pub fn new(config: ControllerConfig, connector: Arc<dyn HostConnector>) -> Self {
        ConnectionSupervisor {
            config,
            connector,
            session: tokio::sync::Mutex::new(None),
            state: RwLock::new(ConnectionState::default()),
            profile: RwLock::new(Arc::new(CapabilityProfile::default_profile())),
            generation: AtomicU64::new(0),
            auto_discovery_complete: AtomicBool::new(false),
            reconnect_in_flight: AtomicBool::new(false),
            last_reconnect: Mutex::new(None),
            dispatch_failures: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    pub fn tier(&self) -> Option<FallbackTier> {
        self.state.read().fallback_tier
    }

    /// Current profile and the generation it was installed under
    pub fn profile(&self) -> (Arc<CapabilityProfile>, u64) {
        let profile = Arc::clone(&self.profile.read());
        (profile, self.generation.load(Ordering::Acquire))
    }

    pub fn auto_discovery_complete(&self) -> bool {
        self.auto_discovery_complete.load(Ordering::Acquire)
    }

    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }

    pub fn reconnect_in_flight(&self) -> bool {
        self.reconnect_in_flight.load(Ordering::Acquire)
    }

    /// Run full fallback passes with exponential backoff between them.
    ///
    /// Resets the reconnect budget. Fails with `TransportUnavailable` when
    /// every pass comes up empty.
    pub async fn initialize(&self) -> MarionetteResult<FallbackTier> {
        self.closed.store(false, Ordering::Release);
        {
            let mut state = self.state.write();
            state.connection_attempts = 0;
            state.reconnect_suppressed = false;
        }

        let passes = self.config.max_connection_attempts.max(1);
        for pass in 0..passes {
            if self.closed.load(Ordering::Acquire) {
                return Err(MarionetteError::AlreadyShutDown);
            }
            if let Some(tier) = self.run_pass().await {
                self.state.write().connection_attempts = 0;
                return Ok(tier);
            }

            if pass + 1 < passes {
                let backoff = self.config.backoff_base() * 2u32.saturating_pow(pass);
                warn!(
                    "Connection pass {}/{} failed, retrying in {:?}",
                    pass + 1,
                    passes,
                    backoff
                );
                sleep(backoff).await;
            }
        }

        let mut state = self.state.write();
        state.connected = false;
        state.fallback_tier = None;
        state.connection_attempts = passes;
        state.last_error = Some(format!("no tier reachable after {} passes", passes));
        Err(MarionetteError::TransportUnavailable { attempts: passes })
    }

    /// One walk through the tiers. Returns the tier that succeeded.
    async fn run_pass(&self) -> Option<FallbackTier> {
        for tier in FallbackTier::ALL {
            match self.try_tier(tier).await {
                Ok(Some(session)) => {
                    self.adopt_session(tier, session).await;
                    return Some(tier);
                }
                Ok(None) => {
                    self.adopt_offline(tier).await;
                    return Some(tier);
                }
                Err(e) => {
                    debug!("Tier {} failed: {}", tier, e);
                    self.state.write().last_error = Some(e.to_string());
                }
            }
        }
        None
    }

    /// `Ok(None)` means an offline tier was accepted
    async fn try_tier(&self, tier: FallbackTier) -> TransportResult<Option<Box<dyn HostSession>>> {
        let direct = Endpoint::new(self.config.host.clone(), self.config.default_port);

        match tier {
            FallbackTier::DirectConnection => self.open(&direct).await.map(Some),
            FallbackTier::RetryWithReset => {
                self.drop_session().await;
                sleep(self.config.retry_reset_delay()).await;
                self.open(&direct).await.map(Some)
            }
            FallbackTier::AlternativePorts => {
                let mut last = TransportError::ConnectFailed("no alternative ports".into());
                for port in &self.config.candidate_ports {
                    if *port == self.config.default_port {
                        continue;
                    }
                    let endpoint = Endpoint::new(self.config.host.clone(), *port);
                    match self.open(&endpoint).await {
                        Ok(session) => return Ok(Some(session)),
                        Err(e) => {
                            debug!("Port {} failed: {}", port, e);
                            last = e;
                        }
                    }
                }
                Err(last)
            }
            FallbackTier::MockMode => {
                if self.config.enable_mock_mode {
                    Ok(None)
                } else {
                    Err(TransportError::ConnectFailed("mock mode disabled".into()))
                }
            }
            FallbackTier::EmergencyLogging => {
                if self.config.enable_emergency_logging {
                    Ok(None)
                } else {
                    Err(TransportError::ConnectFailed("emergency logging disabled".into()))
                }
            }
        }
    }

    /// Connect and authenticate, each step bounded by the connect timeout
    async fn open(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn HostSession>> {
        let limit = self.config.connect_timeout();

        let mut session = timeout(limit, self.connector.connect(endpoint))
            .await
            .map_err(|_| TransportError::Timeout)??;

        match timeout(limit, session.authenticate()).await {
            Ok(Ok(())) => Ok(session),
            Ok(Err(e)) => {
                let _ = timeout(limit, session.close()).await;
                Err(e)
            }
            Err(_) => {
                let _ = timeout(limit, session.close()).await;
                Err(TransportError::Timeout)
            }
        }
    }

    /// Ask the host what it can do. Never fails: any error or an empty
    /// parameter list yields the default profile.
    pub async fn discover(&self, session: &mut dyn HostSession) -> CapabilityProfile {
        match self.try_discover(session).await {
            Ok(profile) => {
                if profile.is_default() {
                    warn!("Host advertised no parameters, using default profile");
                } else {
                    info!(
                        "Discovered model {} with {} parameters ({} mapped)",
                        profile.model_name,
                        profile.available_parameters.len(),
                        profile.mapped_count()
                    );
                }
                profile
            }
            Err(e) => {
                warn!("Model discovery failed: {}", e);
                CapabilityProfile::default_profile()
            }
        }
    }

    async fn try_discover(&self, session: &mut dyn HostSession) -> TransportResult<CapabilityProfile> {
        let limit = self.config.connect_timeout();

        let model = timeout(limit, session.current_model())
            .await
            .map_err(|_| TransportError::Timeout)??;
        let parameters = timeout(limit, session.list_parameters())
            .await
            .map_err(|_| TransportError::Timeout)??;
        // Triggers are optional; a host without them still animates
        let triggers = match timeout(limit, session.list_triggers()).await {
            Ok(Ok(triggers)) => triggers.into_iter().map(|t| t.name).collect(),
            _ => Vec::new(),
        };

        let parameters = parameters
            .into_iter()
            .map(|p| (p.name, ParameterRange::new(p.min, p.max)))
            .collect();

        Ok(CapabilityProfile::from_discovery(model.model_name, parameters, triggers))
    }

    fn install_profile(&self, profile: CapabilityProfile) {
        *self.profile.write() = Arc::new(profile);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.auto_discovery_complete.store(true, Ordering::Release);
    }

    async fn adopt_session(&self, tier: FallbackTier, mut session: Box<dyn HostSession>) {
        let profile = self.discover(session.as_mut()).await;
        let endpoint = session.endpoint().clone();

        {
            let mut slot = self.session.lock().await;
            if let Some(mut old) = slot.take() {
                let _ = timeout(self.config.connect_timeout(), old.close()).await;
            }
            *slot = Some(session);
        }
        self.install_profile(profile);

        let mut state = self.state.write();
        state.connected = true;
        state.fallback_tier = Some(tier);
        state.last_error = None;
        info!("Connected to host at {} via {}", endpoint, tier);
    }

    async fn adopt_offline(&self, tier: FallbackTier) {
        self.drop_session().await;
        self.install_profile(CapabilityProfile::default_profile());

        let mut state = self.state.write();
        state.connected = true;
        state.fallback_tier = Some(tier);
        match tier {
            FallbackTier::MockMode => {
                warn!("Host unreachable, running in mock mode (updates are logged, not sent)")
            }
            _ => warn!("Host unreachable, emergency logging only"),
        }
    }

    async fn drop_session(&self) {
        let old = self.session.lock().await.take();
        if let Some(mut old) = old {
            let _ = timeout(self.config.connect_timeout(), old.close()).await;
        }
    }

    /// Send one batch, bounded by the dispatch timeout
    pub async fn dispatch(&self, batch: &[ParameterValue]) -> MarionetteResult<DispatchOutcome> {
        if batch.is_empty() || self.closed.load(Ordering::Acquire) {
            return Ok(DispatchOutcome::Skipped);
        }

        let (connected, tier) = {
            let state = self.state.read();
            (state.connected, state.fallback_tier)
        };
        let Some(tier) = tier.filter(|_| connected) else {
            return Ok(DispatchOutcome::Skipped);
        };

        if !tier.is_network() {
            debug!("[{}] {} parameters: {:?}", tier, batch.len(), batch);
            return Ok(DispatchOutcome::Logged);
        }

        let mut slot = self.session.lock().await;
        let Some(session) = slot.as_mut() else {
            return Ok(DispatchOutcome::Skipped);
        };

        let result = match timeout(self.config.dispatch_timeout(), session.set_parameters(batch)).await
        {
            Ok(Ok(())) => return Ok(DispatchOutcome::Sent),
            Ok(Err(e)) => e.to_string(),
            Err(_) => TransportError::Timeout.to_string(),
        };

        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        Err(MarionetteError::DispatchFailure(result))
    }

    /// Start a background reconnect if none is running, the rate limit
    /// allows it and the budget is not spent. Returns whether one started.
    pub fn schedule_reconnect(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::Acquire) || self.reconnect_in_flight() {
            return false;
        }

        {
            let mut state = self.state.write();
            if state.reconnect_suppressed {
                return false;
            }
            if state.connected && !state.fallback_tier.map_or(false, |t| t.is_network()) {
                return false;
            }
            if state.connection_attempts >= self.config.max_connection_attempts {
                state.reconnect_suppressed = true;
                let err = MarionetteError::ReconnectExhausted(state.connection_attempts);
                warn!("{}; dispatch failures will only be logged", err);
                state.last_error = Some(err.to_string());
                return false;
            }
        }

        {
            let mut last = self.last_reconnect.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.config.reconnect_min_interval() {
                    return false;
                }
            }
            if self
                .reconnect_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }
            *last = Some(Instant::now());
        }

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.reconnect().await;
            supervisor.reconnect_in_flight.store(false, Ordering::Release);
        });
        true
    }

    /// One reconnect: mark down, wait, drop the old session, single pass
    pub async fn reconnect(&self) {
        let attempt = {
            let mut state = self.state.write();
            state.connection_attempts += 1;
            state.connected = false;
            state.connection_attempts
        };
        info!(
            "Reconnecting to host (attempt {}/{})",
            attempt, self.config.max_connection_attempts
        );

        sleep(self.config.reconnect_delay()).await;
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.drop_session().await;

        match self.run_pass().await {
            Some(tier) if self.closed.load(Ordering::Acquire) => {
                debug!("Shut down during reconnect, discarding {}", tier);
                self.drop_session().await;
                self.state.write().connected = false;
            }
            Some(tier) if tier.is_network() => {
                self.state.write().connection_attempts = 0;
                info!("Reconnection successful via {}", tier);
            }
            Some(tier) => info!("Reconnect fell back to {}", tier),
            None => {
                let mut state = self.state.write();
                state.connected = false;
                state.fallback_tier = None;
                warn!("Reconnection failed");
            }
        }
    }

    /// Fire a host trigger (hotkey)
    pub async fn trigger(&self, name: &str) -> MarionetteResult<()> {
        let tier = self
            .state
            .read()
            .fallback_tier
            .ok_or(MarionetteError::NotRunning)?;

        if !tier.is_network() {
            info!("[{}] trigger {}", tier, name);
            return Ok(());
        }

        let (profile, _) = self.profile();
        if !profile.has_trigger(name) {
            return Err(MarionetteError::UnknownTrigger(name.to_string()));
        }

        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(MarionetteError::NotRunning)?;
        match timeout(self.config.dispatch_timeout(), session.trigger(name)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransportError::Timeout.into()),
        }
    }

    /// Close the session and stop any pending reconnect from reopening it
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.drop_session().await;
        self.state.write().connected = false;
        info!("Host connection closed");
    }
}
