//! Scripted in-memory host
//!
//! Behaves like a real host from the controller's point of view but keeps
//! everything in memory: which ports answer, which operations fail, how
//! slow dispatch is. Every connect, batch, trigger and close is recorded so
//! tests can assert on exactly what reached the "wire".

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marionette_core::{ParameterValue, DEFAULT_HOST_PARAMETERS};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    Endpoint, HostConnector, HostSession, ModelInfo, ParameterInfo, TransportError,
    TransportResult, TriggerInfo,
};

/// Something the scripted host observed, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedEvent {
    Connect(Endpoint),
    Authenticate,
    Batch(Vec<ParameterValue>),
    Trigger(String),
    Close,
}

#[derive(Debug)]
struct ScriptedState {
    /// `None` means every port answers
    reachable_ports: Option<BTreeSet<u16>>,
    model_name: String,
    parameters: Vec<ParameterInfo>,
    triggers: Vec<TriggerInfo>,
    fail_auth: bool,
    fail_discovery: bool,
    fail_dispatch: bool,
    dispatch_latency: Duration,
    events: Vec<ScriptedEvent>,
}

impl Default for ScriptedState {
    fn default() -> Self {
        let mut parameters: Vec<ParameterInfo> = DEFAULT_HOST_PARAMETERS
            .iter()
            .map(|name| ParameterInfo::new(*name, -1.0, 1.0))
            .collect();
        parameters.push(ParameterInfo::new("MouthSmile", 0.0, 1.0));

        ScriptedState {
            reachable_ports: None,
            model_name: "Scripted".to_string(),
            parameters,
            triggers: Vec::new(),
            fail_auth: false,
            fail_discovery: false,
            fail_dispatch: false,
            dispatch_latency: Duration::ZERO,
            events: Vec::new(),
        }
    }
}

/// In-memory host. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        ScriptedConnector::default()
    }

    /// Only these ports accept connections
    pub fn set_reachable_ports(&self, ports: &[u16]) {
        self.state.lock().reachable_ports = Some(ports.iter().copied().collect());
    }

    /// No port accepts connections
    pub fn set_unreachable(&self) {
        self.state.lock().reachable_ports = Some(BTreeSet::new());
    }

    pub fn set_all_reachable(&self) {
        self.state.lock().reachable_ports = None;
    }

    pub fn set_model(&self, name: impl Into<String>) {
        self.state.lock().model_name = name.into();
    }

    pub fn set_parameters(&self, parameters: Vec<ParameterInfo>) {
        self.state.lock().parameters = parameters;
    }

    pub fn set_triggers(&self, names: &[&str]) {
        self.state.lock().triggers = names.iter().map(|n| TriggerInfo::named(*n)).collect();
    }

    pub fn fail_authentication(&self, fail: bool) {
        self.state.lock().fail_auth = fail;
    }

    pub fn fail_discovery(&self, fail: bool) {
        self.state.lock().fail_discovery = fail;
    }

    pub fn fail_dispatch(&self, fail: bool) {
        self.state.lock().fail_dispatch = fail;
    }

    pub fn set_dispatch_latency(&self, latency: Duration) {
        self.state.lock().dispatch_latency = latency;
    }

    pub fn events(&self) -> Vec<ScriptedEvent> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Every endpoint a connect was attempted on, reachable or not
    pub fn connect_attempts(&self) -> Vec<Endpoint> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ScriptedEvent::Connect(ep) => Some(ep.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn batches(&self) -> Vec<Vec<ParameterValue>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ScriptedEvent::Batch(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, ScriptedEvent::Batch(_)))
            .count()
    }

    pub fn last_batch(&self) -> Option<Vec<ParameterValue>> {
        self.state.lock().events.iter().rev().find_map(|e| match e {
            ScriptedEvent::Batch(batch) => Some(batch.clone()),
            _ => None,
        })
    }

    /// Most recent value dispatched for a host parameter
    pub fn last_value(&self, host_name: &str) -> Option<f64> {
        self.state.lock().events.iter().rev().find_map(|e| match e {
            ScriptedEvent::Batch(batch) => batch
                .iter()
                .find(|p| p.name == host_name)
                .map(|p| p.value),
            _ => None,
        })
    }

    pub fn fired_triggers(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ScriptedEvent::Trigger(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, ScriptedEvent::Close))
            .count()
    }

    fn record(&self, event: ScriptedEvent) {
        self.state.lock().events.push(event);
    }
}

#[async_trait]
impl HostConnector for ScriptedConnector {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn HostSession>> {
        self.record(ScriptedEvent::Connect(endpoint.clone()));

        let reachable = match &self.state.lock().reachable_ports {
            Some(ports) => ports.contains(&endpoint.port),
            None => true,
        };
        if !reachable {
            return Err(TransportError::ConnectFailed(format!(
                "connection refused at {}",
                endpoint
            )));
        }

        debug!("Scripted host accepted {}", endpoint);
        Ok(Box::new(ScriptedSession {
            host: self.clone(),
            endpoint: endpoint.clone(),
            closed: false,
        }))
    }

    fn kind(&self) -> &str {
        "scripted"
    }
}

/// Session handed out by [`ScriptedConnector`]
#[derive(Debug)]
pub struct ScriptedSession {
    host: ScriptedConnector,
    endpoint: Endpoint,
    closed: bool,
}

impl ScriptedSession {
    fn ensure_open(&self) -> TransportResult<()> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn discovery_guard(&self) -> TransportResult<()> {
        self.ensure_open()?;
        if self.host.state.lock().fail_discovery {
            return Err(TransportError::Rejected {
                code: 50,
                message: "discovery disabled".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HostSession for ScriptedSession {
    async fn authenticate(&mut self) -> TransportResult<()> {
        self.ensure_open()?;
        if self.host.state.lock().fail_auth {
            return Err(TransportError::AuthenticationFailed("token rejected".into()));
        }
        self.host.record(ScriptedEvent::Authenticate);
        Ok(())
    }

    async fn current_model(&mut self) -> TransportResult<ModelInfo> {
        self.discovery_guard()?;
        Ok(ModelInfo {
            model_name: self.host.state.lock().model_name.clone(),
            loaded: true,
        })
    }

    async fn list_parameters(&mut self) -> TransportResult<Vec<ParameterInfo>> {
        self.discovery_guard()?;
        Ok(self.host.state.lock().parameters.clone())
    }

    async fn list_triggers(&mut self) -> TransportResult<Vec<TriggerInfo>> {
        self.discovery_guard()?;
        Ok(self.host.state.lock().triggers.clone())
    }

    async fn set_parameters(&mut self, batch: &[ParameterValue]) -> TransportResult<()> {
        self.ensure_open()?;
        let latency = self.host.state.lock().dispatch_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.host.state.lock().fail_dispatch {
            return Err(TransportError::Closed);
        }
        self.host.record(ScriptedEvent::Batch(batch.to_vec()));
        Ok(())
    }

    async fn trigger(&mut self, name: &str) -> TransportResult<()> {
        self.ensure_open()?;
        let known = self.host.state.lock().triggers.iter().any(|t| t.name == name);
        if !known {
            return Err(TransportError::Rejected {
                code: 400,
                message: format!("no trigger named {}", name),
            });
        }
        self.host.record(ScriptedEvent::Trigger(name.to_string()));
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.closed {
            self.closed = true;
            self.host.record(ScriptedEvent::Close);
        }
        Ok(())
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}
