//! # Host Bridge Traits
//!
//! Capability contracts between the playback core and the host application.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations
//! - [`MediaServer`](server::MediaServer) - Item details, sessions and progress on the remote server
//!
//! ### Playback
//! - [`QueueEngine`](playback::QueueEngine) - Forward-only queue player owned by the host
//!
//! ### Storage & Utilities
//! - [`SettingsStore`](settings::SettingsStore) - Key-value preferences storage
//! - [`Clock`](time::Clock) - Wall-clock source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and keep messages actionable.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; the coordinator shares implementations
//! across tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod playback;
pub mod server;
pub mod settings;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use playback::{EngineEvent, EngineEventKind, EngineEventSink, QueueEngine, QueueId, QueueItem};
pub use server::{
    ItemDetails, MediaServer, ProgressUpdate, RemoteAudioFile, RemoteTrack, SessionSync,
    StartedSession,
};
pub use settings::{InMemorySettingsStore, SettingsStore};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
