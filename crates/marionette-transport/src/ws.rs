//! Websocket JSON adapter
//!
//! Speaks the request/response envelope used by plugin-style animation
//! hosts: every request carries `apiName`, `apiVersion`, a `requestID`,
//! a `messageType` and a `data` object, and the host answers with the same
//! envelope (or an `APIError`).

use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use marionette_core::ParameterValue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{
    Endpoint, HostConnector, HostSession, ModelInfo, ParameterInfo, TransportError,
    TransportResult, TriggerInfo,
};

pub const API_NAME: &str = "VTubeStudioPublicAPI";
pub const API_VERSION: &str = "1.0";

/// Identity presented to the host during authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub developer: String,
    /// Where the granted token is cached between runs
    pub token_path: Option<PathBuf>,
}

impl Default for PluginInfo {
    fn default() -> Self {
        PluginInfo {
            name: "Marionette".to_string(),
            developer: "Marionette Contributors".to_string(),
            token_path: Some(PathBuf::from("./marionette_token.txt")),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestEnvelope<'a> {
    api_name: &'a str,
    api_version: &'a str,
    #[serde(rename = "requestID")]
    request_id: String,
    message_type: &'a str,
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "requestID", default)]
    pub request_id: String,
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Serialize one request
pub fn encode_request(request_id: &str, message_type: &str, data: Value) -> TransportResult<String> {
    let envelope = RequestEnvelope {
        api_name: API_NAME,
        api_version: API_VERSION,
        request_id: request_id.to_string(),
        message_type,
        data,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse one response; `APIError` responses become `Rejected`
pub fn decode_response(text: &str) -> TransportResult<ResponseEnvelope> {
    let envelope: ResponseEnvelope = serde_json::from_str(text)?;
    if envelope.message_type == "APIError" {
        let code = envelope.data.get("errorID").and_then(Value::as_i64).unwrap_or(-1);
        let message = envelope
            .data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified")
            .to_string();
        return Err(TransportError::Rejected { code, message });
    }
    Ok(envelope)
}

/// Collect default and custom parameters from a parameter list response.
/// Missing bounds default to `[0, 1]`.
pub fn parse_parameter_list(data: &Value) -> Vec<ParameterInfo> {
    ["defaultParameters", "customParameters", "parameters"]
        .iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(|p| {
            let name = p.get("name").and_then(Value::as_str)?;
            let min = p.get("min").and_then(Value::as_f64).unwrap_or(0.0);
            let max = p.get("max").and_then(Value::as_f64).unwrap_or(1.0);
            Some(ParameterInfo::new(name, min, max))
        })
        .collect()
}

pub fn parse_trigger_list(data: &Value) -> Vec<TriggerInfo> {
    data.get("availableHotkeys")
        .and_then(Value::as_array)
        .map(|hotkeys| {
            hotkeys
                .iter()
                .filter_map(|hk| {
                    let name = hk.get("name").and_then(Value::as_str)?;
                    let id = hk.get("hotkeyID").and_then(Value::as_str).map(str::to_string);
                    Some(TriggerInfo {
                        name: name.to_string(),
                        id,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Opens websocket sessions
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    plugin: PluginInfo,
}

impl WsConnector {
    pub fn new(plugin: PluginInfo) -> Self {
        WsConnector { plugin }
    }
}

#[async_trait]
impl HostConnector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn HostSession>> {
        let url = endpoint.url();
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!("Connected to host at {}", url);

        Ok(Box::new(WsSession {
            stream,
            endpoint: endpoint.clone(),
            plugin: self.plugin.clone(),
            next_request: 0,
            triggers: Vec::new(),
        }))
    }

    fn kind(&self) -> &str {
        "websocket"
    }
}

/// Websocket session with a plugin-style host
pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    endpoint: Endpoint,
    plugin: PluginInfo,
    next_request: u64,
    /// Last trigger list, used to translate names into host ids
    triggers: Vec<TriggerInfo>,
}

impl WsSession {
    async fn request(&mut self, message_type: &str, data: Value) -> TransportResult<Value> {
        self.next_request += 1;
        let request_id = format!("marionette-{}", self.next_request);
        let payload = encode_request(&request_id, message_type, data)?;

        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        while let Some(message) = self.stream.next().await {
            let message = message.map_err(|e| TransportError::Protocol(e.to_string()))?;
            match message {
                Message::Text(text) => {
                    let envelope = decode_response(&text)?;
                    if !envelope.request_id.is_empty() && envelope.request_id != request_id {
                        debug!("Skipping unsolicited response {}", envelope.request_id);
                        continue;
                    }
                    return Ok(envelope.data);
                }
                Message::Close(_) => return Err(TransportError::Closed),
                _ => continue,
            }
        }

        Err(TransportError::Closed)
    }

    async fn load_token(&self) -> Option<String> {
        let path = self.plugin.token_path.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(token) if !token.trim().is_empty() => Some(token.trim().to_string()),
            _ => None,
        }
    }

    async fn store_token(&self, token: &str) {
        if let Some(path) = &self.plugin.token_path {
            if let Err(e) = tokio::fs::write(path, token).await {
                warn!("Could not cache authentication token at {}: {}", path.display(), e);
            }
        }
    }

    async fn request_token(&mut self) -> TransportResult<String> {
        let data = json!({
            "pluginName": self.plugin.name,
            "pluginDeveloper": self.plugin.developer,
        });
        let response = self.request("AuthenticationTokenRequest", data).await?;
        let token = response
            .get("authenticationToken")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Protocol("missing authenticationToken".into()))?
            .to_string();
        self.store_token(&token).await;
        Ok(token)
    }

    async fn authenticate_with(&mut self, token: &str) -> TransportResult<bool> {
        let data = json!({
            "pluginName": self.plugin.name,
            "pluginDeveloper": self.plugin.developer,
            "authenticationToken": token,
        });
        let response = self.request("AuthenticationRequest", data).await?;
        Ok(response
            .get("authenticated")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}

#[async_trait]
impl HostSession for WsSession {
    async fn authenticate(&mut self) -> TransportResult<()> {
        if let Some(cached) = self.load_token().await {
            if self.authenticate_with(&cached).await? {
                return Ok(());
            }
            debug!("Cached token rejected, requesting a new one");
        }

        let token = self.request_token().await?;
        if self.authenticate_with(&token).await? {
            Ok(())
        } else {
            Err(TransportError::AuthenticationFailed(
                "host did not accept the plugin token".into(),
            ))
        }
    }

    async fn current_model(&mut self) -> TransportResult<ModelInfo> {
        let data = self.request("CurrentModelRequest", json!({})).await?;
        Ok(ModelInfo {
            model_name: data
                .get("modelName")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            loaded: data.get("modelLoaded").and_then(Value::as_bool).unwrap_or(true),
        })
    }

    async fn list_parameters(&mut self) -> TransportResult<Vec<ParameterInfo>> {
        let data = self.request("InputParameterListRequest", json!({})).await?;
        Ok(parse_parameter_list(&data))
    }

    async fn list_triggers(&mut self) -> TransportResult<Vec<TriggerInfo>> {
        let data = self.request("HotkeysInCurrentModelRequest", json!({})).await?;
        let triggers = parse_trigger_list(&data);
        self.triggers = triggers.clone();
        Ok(triggers)
    }

    async fn set_parameters(&mut self, batch: &[ParameterValue]) -> TransportResult<()> {
        let values: Vec<Value> = batch
            .iter()
            .map(|p| json!({ "id": p.name, "value": p.value }))
            .collect();
        let data = json!({
            "faceFound": false,
            "mode": "set",
            "parameterValues": values,
        });
        self.request("InjectParameterDataRequest", data).await?;
        Ok(())
    }

    async fn trigger(&mut self, name: &str) -> TransportResult<()> {
        let id = self
            .triggers
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| t.id.clone())
            .unwrap_or_else(|| name.to_string());
        self.request("HotkeyTriggerRequest", json!({ "hotkeyID": id }))
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request_envelope() {
        let text = encode_request("r-1", "CurrentModelRequest", json!({})).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["apiName"], API_NAME);
        assert_eq!(v["apiVersion"], API_VERSION);
        assert_eq!(v["requestID"], "r-1");
        assert_eq!(v["messageType"], "CurrentModelRequest");
    }

    #[test]
    fn test_decode_api_error() {
        let text = r#"{"apiName":"VTubeStudioPublicAPI","requestID":"x","messageType":"APIError","data":{"errorID":8,"message":"not authenticated"}}"#;
        match decode_response(text) {
            Err(TransportError::Rejected { code, message }) => {
                assert_eq!(code, 8);
                assert_eq!(message, "not authenticated");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_is_protocol_error() {
        assert!(matches!(
            decode_response("not json"),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_parameter_list_defaults_bounds() {
        let data = json!({
            "defaultParameters": [
                {"name": "FaceAngleX", "min": -30.0, "max": 30.0},
                {"name": "MouthSmile"}
            ],
            "customParameters": [
                {"name": "CheekPuff", "min": 0.0, "max": 1.0},
                {"min": 0.0}
            ]
        });
        let params = parse_parameter_list(&data);
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], ParameterInfo::new("FaceAngleX", -30.0, 30.0));
        assert_eq!(params[1], ParameterInfo::new("MouthSmile", 0.0, 1.0));
        assert_eq!(params[2].name, "CheekPuff");
    }

    #[test]
    fn test_parse_trigger_list() {
        let data = json!({
            "availableHotkeys": [
                {"name": "Wave", "hotkeyID": "abc123"},
                {"name": "Spin"}
            ]
        });
        let triggers = parse_trigger_list(&data);
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].id.as_deref(), Some("abc123"));
        assert_eq!(triggers[1], TriggerInfo::named("Spin"));
        assert!(parse_trigger_list(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = WsConnector::default();
        let result = connector.connect(&Endpoint::new("127.0.0.1", port)).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
