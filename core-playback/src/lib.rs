//! # Playback Coordinator
//!
//! Turns a multi-file audiobook into one continuous timeline and drives a
//! host-provided forward-only queue engine over it.
//!
//! ## Overview
//!
//! This module handles:
//! - Building a [`Playlist`] from server item details
//! - Mapping absolute book time to (track, offset) and back
//! - Choosing the cheapest engine primitive for each seek
//! - Listening sessions, periodic syncs and durable progress
//! - Rate preference and the sleep timer
//!
//! All state lives in one coordinator task; callers talk to it through a
//! cloneable [`PlaybackHandle`] and observe it through [`PlaybackSnapshot`]s
//! and [`core_runtime::events`].

pub mod coordinator;
pub mod error;
pub mod handle;
pub mod playlist;
pub mod session;
pub mod sleep_timer;
pub mod state;
pub mod timeline;

pub use coordinator::{spawn, PlaybackDeps, RATE_SETTING_KEY};
pub use core_runtime::config::PlaybackTuning;
pub use error::{PlaybackError, Result};
pub use handle::PlaybackHandle;
pub use playlist::{Playlist, Track};
pub use session::{PlaybackSession, SessionManager};
pub use sleep_timer::SleepTimer;
pub use state::{LoadingStatus, PlaybackSnapshot, PlayerState};
pub use timeline::{Navigation, TrackPosition};
