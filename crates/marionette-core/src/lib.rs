//! Marionette Core - Fundamental types for avatar control
//!
//! This crate defines the types shared by every layer of the controller:
//! - Emotion kinds, the emotion profile table and the keyword lexicon
//! - Parameter values, ranges and semantic parameter names
//! - Capability profiles with adaptive semantic -> host name mapping
//! - The error taxonomy

pub mod capability;
pub mod emotion;
pub mod error;
pub mod parameter;

pub use capability::*;
pub use emotion::*;
pub use error::*;
pub use parameter::*;
