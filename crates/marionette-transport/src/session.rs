//! Host connector and session traits
//!
//! The controller only ever sees these traits. Concrete hosts (websocket,
//! scripted, chaos wrappers) plug in behind them.

use std::fmt;

use async_trait::async_trait;
use marionette_core::ParameterValue;
use serde::{Deserialize, Serialize};

use crate::TransportResult;

/// Where the host listens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        if self.host.starts_with("ws://") || self.host.starts_with("wss://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("ws://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub model_name: String,
    pub loaded: bool,
}

/// A parameter the host can animate, with its declared range
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl ParameterInfo {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        ParameterInfo {
            name: name.into(),
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerInfo {
    pub name: String,
    /// Host-side identifier, when different from the name
    pub id: Option<String>,
}

impl TriggerInfo {
    pub fn named(name: impl Into<String>) -> Self {
        TriggerInfo {
            name: name.into(),
            id: None,
        }
    }
}

/// Opens sessions to the host
#[async_trait]
pub trait HostConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn HostSession>>;

    /// Connector name for logs
    fn kind(&self) -> &str;
}

/// One open session with the host
#[async_trait]
pub trait HostSession: Send {
    async fn authenticate(&mut self) -> TransportResult<()>;

    async fn current_model(&mut self) -> TransportResult<ModelInfo>;

    async fn list_parameters(&mut self) -> TransportResult<Vec<ParameterInfo>>;

    async fn list_triggers(&mut self) -> TransportResult<Vec<TriggerInfo>>;

    /// Set many parameters in one request
    async fn set_parameters(&mut self, batch: &[ParameterValue]) -> TransportResult<()>;

    async fn trigger(&mut self, name: &str) -> TransportResult<()>;

    async fn close(&mut self) -> TransportResult<()>;

    fn endpoint(&self) -> &Endpoint;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let ep = Endpoint::new("127.0.0.1", 8001);
        assert_eq!(ep.url(), "ws://127.0.0.1:8001");
        assert_eq!(ep.to_string(), "127.0.0.1:8001");

        let ep = Endpoint::new("wss://studio.local", 9001);
        assert_eq!(ep.url(), "wss://studio.local:9001");
    }
}
