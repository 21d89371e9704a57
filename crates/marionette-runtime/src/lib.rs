//! Marionette Runtime - the avatar control loop
//!
//! This crate wires the lower layers into a running controller:
//! - Configuration loading (file, environment, explicit overrides)
//! - Logging setup
//! - The emotion director and the per-tick animation pipeline
//! - The connection supervisor with its fallback tiers
//! - `AvatarController`, the public handle

pub mod clock;
pub mod config;
pub mod controller;
pub mod director;
pub mod logging;
pub mod scheduler;
pub mod supervisor;

pub use clock::SessionClock;
pub use config::{load_config, ConfigError, ConfigResult, ControllerConfig};
pub use controller::{AvatarController, ControllerStatus};
pub use logging::init_logging;
pub use scheduler::{compute_frame, AnimationState, FrameBatch, SchedulerState};
pub use supervisor::{ConnectionState, ConnectionSupervisor, DispatchOutcome, FallbackTier};
