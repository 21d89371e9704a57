//! Marionette Transport - request/response access to the animation host
//!
//! This crate provides:
//! - The `HostConnector` / `HostSession` seam the controller talks through
//! - A websocket JSON adapter for plugin-style animation hosts
//! - A scripted in-memory host for tests and offline demos

pub mod error;
pub mod scripted;
pub mod session;
pub mod ws;

pub use error::*;
pub use scripted::{ScriptedConnector, ScriptedEvent, ScriptedSession};
pub use session::*;
pub use ws::{PluginInfo, WsConnector, WsSession};
