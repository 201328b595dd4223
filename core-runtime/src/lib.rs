//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the playback core:
//! - Logging and tracing infrastructure
//! - Configuration management (`CoreConfig`, `PlaybackTuning`)
//! - Event bus system
//!
//! ## Overview
//!
//! Every other crate depends on this one for its logging conventions, its
//! validated configuration and the broadcast channel used to publish playback
//! and session events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, PlaybackTuning};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, PlaybackEvent, SessionEvent};
