//! # Core Configuration Module
//!
//! Provides configuration management for the playback core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding the server endpoint, credentials, injected bridges and playback
//! tuning. Validation is fail-fast: a misconfigured core is rejected before any
//! network call is made.
//!
//! ## Required Settings
//!
//! - `server_url` - base URL of the media server
//! - `api_token` - bearer token used for every request
//! - `HttpClient` - transport (desktop default: reqwest, with `desktop-shims`)
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `SettingsStore` - preference storage (default: in-memory, or SQLite when a
//!   `settings_path` is given and `desktop-shims` is enabled)
//! - `Clock` - wall clock for progress timestamps (default: system clock)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .server_url("https://abs.example.com")
//!     .api_token("secret-token")
//!     .http_client(Arc::new(MyHttpClient))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing server URL and token
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing server settings");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, InMemorySettingsStore, SettingsStore, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default client name reported to the server when opening sessions.
pub const DEFAULT_CLIENT_NAME: &str = "shelf-playback-core";

/// Core configuration for the playback core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL of the media server, without a trailing slash
    pub server_url: String,

    /// Bearer token for server requests
    pub api_token: String,

    /// HTTP transport
    pub http_client: Arc<dyn HttpClient>,

    /// Preference storage (playback rate)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Wall clock used for `lastUpdate` timestamps
    pub clock: Arc<dyn Clock>,

    /// Device identifier sent when a session is opened
    pub device_id: String,

    /// Client name sent when a session is opened
    pub client_name: String,

    /// Playback timing constants
    pub tuning: PlaybackTuning,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("server_url", &self.server_url)
            .field("api_token", &"<redacted>")
            .field("http_client", &"HttpClient { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .field("device_id", &self.device_id)
            .field("client_name", &self.client_name)
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Server URL is non-empty and uses http(s)
    /// - API token is non-empty
    /// - Playback tuning values are consistent
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(Error::Config("Server URL cannot be empty".to_string()));
        }

        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Server URL must start with http:// or https://, got '{}'",
                self.server_url
            )));
        }

        if self.api_token.trim().is_empty() {
            return Err(Error::Config("API token cannot be empty".to_string()));
        }

        self.tuning.validate()
    }
}

// ============================================================================
// Playback Tuning
// ============================================================================

fn default_session_sync_interval_secs() -> u64 {
    15
}

fn default_progress_save_interval_secs() -> u64 {
    90
}

fn default_resume_rewind_secs() -> f64 {
    5.0
}

fn default_previous_restart_threshold_secs() -> f64 {
    3.0
}

fn default_track_settle_delay_ms() -> u64 {
    500
}

fn default_finished_threshold() -> f64 {
    0.99
}

fn default_min_rate() -> f32 {
    0.5
}

fn default_max_rate() -> f32 {
    3.0
}

fn default_rate_presets() -> Vec<f32> {
    vec![1.0, 1.25, 1.5, 1.75, 2.0, 0.75]
}

fn default_sleep_tick_ms() -> u64 {
    1000
}

/// Timing constants for the playback coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTuning {
    /// Period of the session sync timer while playing.
    #[serde(default = "default_session_sync_interval_secs")]
    pub session_sync_interval_secs: u64,

    /// Period of the durable progress timer while playing.
    #[serde(default = "default_progress_save_interval_secs")]
    pub progress_save_interval_secs: u64,

    /// Seconds subtracted from the saved position when resuming.
    #[serde(default = "default_resume_rewind_secs")]
    pub resume_rewind_secs: f64,

    /// `previous_chapter` restarts the current track when more than this
    /// many seconds into it.
    #[serde(default = "default_previous_restart_threshold_secs")]
    pub previous_restart_threshold_secs: f64,

    /// Delay before the post-boundary position refresh.
    #[serde(default = "default_track_settle_delay_ms")]
    pub track_settle_delay_ms: u64,

    /// Progress ratio at or above which an item counts as finished.
    #[serde(default = "default_finished_threshold")]
    pub finished_threshold: f64,

    #[serde(default = "default_min_rate")]
    pub min_rate: f32,

    #[serde(default = "default_max_rate")]
    pub max_rate: f32,

    /// Rates cycled by `toggle_rate`.
    #[serde(default = "default_rate_presets")]
    pub rate_presets: Vec<f32>,

    #[serde(default = "default_sleep_tick_ms")]
    pub sleep_tick_ms: u64,
}

impl Default for PlaybackTuning {
    fn default() -> Self {
        Self {
            session_sync_interval_secs: default_session_sync_interval_secs(),
            progress_save_interval_secs: default_progress_save_interval_secs(),
            resume_rewind_secs: default_resume_rewind_secs(),
            previous_restart_threshold_secs: default_previous_restart_threshold_secs(),
            track_settle_delay_ms: default_track_settle_delay_ms(),
            finished_threshold: default_finished_threshold(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            rate_presets: default_rate_presets(),
            sleep_tick_ms: default_sleep_tick_ms(),
        }
    }
}

impl PlaybackTuning {
    pub fn session_sync_interval(&self) -> Duration {
        Duration::from_secs(self.session_sync_interval_secs)
    }

    pub fn progress_save_interval(&self) -> Duration {
        Duration::from_secs(self.progress_save_interval_secs)
    }

    pub fn track_settle_delay(&self) -> Duration {
        Duration::from_millis(self.track_settle_delay_ms)
    }

    pub fn sleep_tick(&self) -> Duration {
        Duration::from_millis(self.sleep_tick_ms)
    }

    /// Clamps `rate` into the supported range.
    pub fn clamp_rate(&self, rate: f32) -> f32 {
        if rate.is_nan() {
            return 1.0;
        }
        rate.clamp(self.min_rate, self.max_rate)
    }

    /// Returns the preset following `current`, wrapping around.
    ///
    /// A rate that is not a preset maps to the first one. With no presets
    /// the rate is left unchanged.
    pub fn next_preset(&self, current: f32) -> f32 {
        let position = self
            .rate_presets
            .iter()
            .position(|preset| (preset - current).abs() < 1e-3);

        let next = match position {
            Some(index) => self.rate_presets.get((index + 1) % self.rate_presets.len()),
            None => self.rate_presets.first(),
        };
        next.copied().unwrap_or(current)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_sync_interval_secs == 0 || self.progress_save_interval_secs == 0 {
            return Err(Error::Config(
                "Sync and progress intervals must be greater than 0 seconds".to_string(),
            ));
        }

        if self.sleep_tick_ms == 0 {
            return Err(Error::Config(
                "Sleep timer tick must be greater than 0ms".to_string(),
            ));
        }

        if self.resume_rewind_secs < 0.0 || self.previous_restart_threshold_secs < 0.0 {
            return Err(Error::Config(
                "Rewind and restart thresholds cannot be negative".to_string(),
            ));
        }

        if !(self.finished_threshold > 0.0 && self.finished_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "Finished threshold must be in (0, 1], got {}",
                self.finished_threshold
            )));
        }

        if !(self.min_rate > 0.0 && self.min_rate <= self.max_rate) {
            return Err(Error::Config(format!(
                "Invalid rate range {}..={}",
                self.min_rate, self.max_rate
            )));
        }

        if self.rate_presets.is_empty() {
            return Err(Error::Config(
                "At least one rate preset is required".to_string(),
            ));
        }

        if let Some(preset) = self
            .rate_presets
            .iter()
            .find(|preset| **preset < self.min_rate || **preset > self.max_rate)
        {
            return Err(Error::Config(format!(
                "Rate preset {} is outside {}..={}",
                preset, self.min_rate, self.max_rate
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Default Capabilities
// ============================================================================

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the media server. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile/Web: inject the host platform's HTTP bridge."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(settings_path: Option<PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let Some(path) = settings_path else {
        let store: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::new());
        return Ok(store);
    };

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // block_on panics inside a runtime, so hop to a plain thread there
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(settings_path: Option<PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    if settings_path.is_some() {
        tracing::warn!("settings_path ignored without the 'desktop-shims' feature");
    }
    let store: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::new());
    Ok(store)
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    server_url: Option<String>,
    api_token: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    settings_path: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
    device_id: Option<String>,
    client_name: Option<String>,
    tuning: Option<PlaybackTuning>,
}

impl CoreConfigBuilder {
    /// Sets the media server base URL. A trailing slash is stripped.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .server_url("https://abs.example.com/");
    /// ```
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.server_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    /// Sets the bearer token used for server requests.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the settings store implementation.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Path of the SQLite settings database used when no settings store is
    /// injected (requires `desktop-shims`).
    pub fn settings_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Overrides the playback timing constants.
    pub fn tuning(mut self, tuning: PlaybackTuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the server URL or token is missing or invalid
    /// - [`Error::CapabilityMissing`] when no HTTP client can be provided
    pub fn build(self) -> Result<CoreConfig> {
        let server_url = self.server_url.ok_or_else(|| {
            Error::Config("Server URL is required. Use .server_url() to set it.".to_string())
        })?;

        let api_token = self.api_token.ok_or_else(|| {
            Error::Config("API token is required. Use .api_token() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.settings_path)?,
        };

        let config = CoreConfig {
            server_url,
            api_token,
            http_client,
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            device_id: self
                .device_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            client_name: self
                .client_name
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            tuning: self.tuning.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
