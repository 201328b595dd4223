//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP transport,
//! settings storage, the audio queue engine) into the playback core. Desktop
//! apps typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`](core_runtime::config::CoreConfig) fall back to the
//! `bridge-desktop` reqwest client and SQLite settings store.
//!
//! There is no global instance: the host builds one [`CoreService`] at start
//! up and hands clones of its [`PlaybackHandle`] to whatever needs playback.

pub mod error;

pub use error::{CoreError, Result};

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::{MediaServer, QueueEngine};
use core_playback::{PlaybackDeps, PlaybackHandle};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use provider_audiobookshelf::AudiobookshelfConnector;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    server: Arc<dyn MediaServer>,
    events: EventBus,
    playback: PlaybackHandle,
}

impl CoreService {
    /// Builds the server provider from `config` and spawns the playback
    /// coordinator on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`CoreError::Runtime`] when the configuration does not validate, or
    /// [`CoreError::Playback`] when the playback tuning is rejected.
    pub fn start(config: CoreConfig, engine: Arc<dyn QueueEngine>) -> Result<Self> {
        config.validate()?;

        let server: Arc<dyn MediaServer> = Arc::new(
            AudiobookshelfConnector::new(
                Arc::clone(&config.http_client),
                config.server_url.clone(),
                config.api_token.clone(),
            )
            .with_device(config.device_id.clone(), config.client_name.clone()),
        );

        let events = EventBus::default();
        let playback = core_playback::spawn(PlaybackDeps {
            engine,
            server: Arc::clone(&server),
            settings: Arc::clone(&config.settings_store),
            clock: Arc::clone(&config.clock),
            events: events.clone(),
            tuning: config.tuning.clone(),
            media_headers: media_headers(&config),
        })?;

        info!(
            server_url = %config.server_url,
            device_id = %config.device_id,
            "Core service started"
        );

        Ok(Self {
            config: Arc::new(config),
            server,
            events,
            playback,
        })
    }

    /// Handle to the playback coordinator.
    pub fn playback(&self) -> &PlaybackHandle {
        &self.playback
    }

    /// The media server the coordinator talks to.
    pub fn server(&self) -> Arc<dyn MediaServer> {
        Arc::clone(&self.server)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Subscribes to playback and session events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Closes the listening session and stops the coordinator.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down core service");
        self.playback.teardown().await?;
        Ok(())
    }
}

/// Headers the engine needs to stream protected content URLs.
fn media_headers(config: &CoreConfig) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        "Authorization".to_string(),
        format!("Bearer {}", config.api_token),
    );
    headers
}

/// Convenience bootstrapper for desktop hosts.
///
/// Uses the reqwest HTTP client and, when `settings_path` is given, a SQLite
/// settings file; otherwise preferences only live for the process.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example(engine: std::sync::Arc<dyn bridge_traits::QueueEngine>) -> core_service::Result<()> {
/// use core_service::bootstrap_desktop;
///
/// let core = bootstrap_desktop("https://abs.example.com", "token", Some("settings.db".into()), engine)?;
/// core.playback().load("li_abc", None).await?;
/// core.playback().play().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(
    server_url: &str,
    api_token: &str,
    settings_path: Option<std::path::PathBuf>,
    engine: Arc<dyn QueueEngine>,
) -> Result<CoreService> {
    let mut builder = CoreConfig::builder()
        .server_url(server_url)
        .api_token(api_token);
    if let Some(path) = settings_path {
        builder = builder.settings_path(path);
    }

    let config = builder
        .build()
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    CoreService::start(config, engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        EngineEvent, EngineEventKind, EngineEventSink, HttpClient, HttpRequest, HttpResponse,
        QueueId, QueueItem,
    };
    use bytes::Bytes;
    use core_playback::PlayerState;
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    /// Engine that is ready immediately and remembers the last queue.
    #[derive(Default)]
    struct ReadyEngine {
        items: Mutex<Vec<QueueItem>>,
    }

    #[async_trait]
    impl QueueEngine for ReadyEngine {
        async fn load_queue(
            &self,
            queue: QueueId,
            items: Vec<QueueItem>,
            events: EngineEventSink,
        ) -> BridgeResult<()> {
            *self.items.lock().unwrap() = items;
            events.send(EngineEvent::new(queue, EngineEventKind::Ready)).unwrap();
            Ok(())
        }
        async fn play(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn pause_at_zero_rate(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek_within_current(&self, _offset: f64) -> BridgeResult<()> {
            Ok(())
        }
        async fn advance_to_next(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn rebuild_from(
            &self,
            queue: QueueId,
            _track_index: usize,
            items: Vec<QueueItem>,
            events: EngineEventSink,
        ) -> BridgeResult<()> {
            self.load_queue(queue, items, events).await
        }
        async fn set_rate(&self, _rate: f32) -> BridgeResult<()> {
            Ok(())
        }
        async fn current_item(&self) -> BridgeResult<Option<usize>> {
            Ok(Some(0))
        }
        async fn position_in_current(&self) -> BridgeResult<f64> {
            Ok(0.0)
        }
        async fn teardown(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn ok(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn config(http: MockHttpClient) -> CoreConfig {
        CoreConfig::builder()
            .server_url("https://abs.example.com/")
            .api_token("secret-token")
            .http_client(Arc::new(http))
            .settings_store(Arc::new(bridge_traits::InMemorySettingsStore::new()))
            .device_id("device-1")
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_through_service_uses_authenticated_media_urls() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|req| {
            assert_eq!(
                req.headers.get("Authorization"),
                Some(&"Bearer secret-token".to_string())
            );
            if req.url.contains("/api/me/progress/") {
                return Ok(HttpResponse {
                    status: 404,
                    headers: HashMap::new(),
                    body: Bytes::from("Not Found"),
                });
            }
            Ok(ok(r#"{
                "id": "li_1",
                "media": {
                    "metadata": { "title": "Dune" },
                    "tracks": [
                        { "index": 1, "startOffset": 0, "duration": 100.0,
                          "contentUrl": "/api/items/li_1/file/11" }
                    ]
                }
            }"#))
        });

        let engine = Arc::new(ReadyEngine::default());
        let service = CoreService::start(config(http), engine.clone()).unwrap();

        service.playback().load("li_1", None).await.unwrap();
        assert_eq!(service.playback().snapshot().state, PlayerState::Ready);

        let items = engine.items.lock().unwrap().clone();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://abs.example.com/api/items/li_1/file/11");
        assert_eq!(
            items[0].headers.get("Authorization"),
            Some(&"Bearer secret-token".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_playback() {
        let service =
            CoreService::start(config(MockHttpClient::new()), Arc::new(ReadyEngine::default()))
                .unwrap();

        service.shutdown().await.unwrap();

        assert!(matches!(
            service.playback().play().await,
            Err(core_playback::PlaybackError::CoordinatorStopped)
        ));
        assert!(!service.playback().is_running());
    }

    #[test]
    fn test_config_exposed() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let service =
            CoreService::start(config(MockHttpClient::new()), Arc::new(ReadyEngine::default()))
                .unwrap();
        assert_eq!(service.config().server_url, "https://abs.example.com/");
        assert_eq!(service.config().device_id, "device-1");
    }
}
