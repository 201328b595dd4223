//! Audiobookshelf API connector implementation
//!
//! Implements the `MediaServer` trait on top of an injected `HttpClient`.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::server::{
    ItemDetails, MediaServer, ProgressUpdate, RemoteAudioFile, RemoteTrack, SessionSync,
    StartedSession,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::AudiobookshelfError;
use crate::types::{
    AudioTrack, DeviceInfo, LibraryItem, MediaProgress, PlayRequest, PlaybackSessionResponse,
    ProgressRequest, SyncRequest,
};

/// Timeout applied to every API call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Formats handed to the server so it picks direct play over transcoding
const SUPPORTED_MIME_TYPES: &[&str] = &[
    "audio/flac",
    "audio/mpeg",
    "audio/mp4",
    "audio/ogg",
    "audio/aac",
    "audio/webm",
];

const DEFAULT_MIME_TYPE: &str = "audio/mpeg";

/// Audiobookshelf API connector
///
/// # Example
///
/// ```ignore
/// use provider_audiobookshelf::AudiobookshelfConnector;
/// use bridge_traits::server::MediaServer;
///
/// let connector = AudiobookshelfConnector::new(http_client, "https://abs.example.com", token);
/// let details = connector.fetch_item_details("li_abc").await?;
/// ```
pub struct AudiobookshelfConnector {
    http_client: Arc<dyn HttpClient>,

    /// Server root without a trailing slash
    base_url: String,

    /// API token sent as a bearer credential
    api_token: String,

    device_id: String,
    client_name: String,

    /// Retry policy for idempotent reads
    read_retry: RetryPolicy,
}

impl AudiobookshelfConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            base_url,
            api_token: api_token.into(),
            device_id: "unknown-device".to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            read_retry: RetryPolicy::default(),
        }
    }

    /// Identity reported to the server when opening sessions.
    pub fn with_device(mut self, device_id: impl Into<String>, client_name: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self.client_name = client_name.into();
        self
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a server-relative content URL against the server root.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn encode(id: &str) -> String {
        urlencoding::encode(id).into_owned()
    }

    /// Sends an authenticated request and maps non-2xx statuses.
    async fn send(&self, request: HttpRequest, policy: RetryPolicy, resource: &str) -> Result<HttpResponse> {
        let request = request
            .bearer_token(&self.api_token)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self.http_client.execute_with_retry(request, policy).await?;
        if response.is_success() {
            debug!(status = response.status, "API request succeeded");
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        warn!(status = response.status, resource, "API request failed");
        Err(AudiobookshelfError::from_status(response.status, resource, body).into())
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            AudiobookshelfError::ParseError(format!("Failed to parse {}: {}", what, e)).into()
        })
    }

    fn convert_track(&self, track: AudioTrack) -> RemoteTrack {
        RemoteTrack {
            index: track.index,
            start_offset: track.start_offset,
            duration: track.duration,
            title: track
                .title
                .unwrap_or_else(|| format!("Track {}", track.index)),
            content_url: self.resolve_url(&track.content_url),
            mime_type: track
                .mime_type
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        }
    }

    fn convert_item(&self, item: LibraryItem) -> ItemDetails {
        let item_id = item.id;
        let media = item.media;

        let tracks = media
            .tracks
            .into_iter()
            .map(|track| self.convert_track(track))
            .collect();

        let audio_files = media
            .audio_files
            .into_iter()
            .map(|file| RemoteAudioFile {
                index: file.index,
                duration: file.duration.unwrap_or(0.0),
                title: file
                    .metadata
                    .filename
                    .unwrap_or_else(|| format!("File {}", file.index)),
                content_url: self.resolve_url(&format!(
                    "/api/items/{}/file/{}",
                    Self::encode(&item_id),
                    Self::encode(&file.ino)
                )),
                mime_type: file
                    .mime_type
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            })
            .collect();

        ItemDetails {
            title: media.metadata.title.unwrap_or_default(),
            id: item_id,
            tracks,
            audio_files,
            duration: media.duration,
        }
    }

    fn sync_body(sync: SessionSync) -> SyncRequest {
        SyncRequest {
            current_time: sync.current_time,
            time_listened: sync.time_listened,
            duration: sync.duration,
        }
    }
}

#[async_trait]
impl MediaServer for AudiobookshelfConnector {
    #[instrument(skip(self))]
    async fn fetch_item_details(&self, item_id: &str) -> Result<ItemDetails> {
        let url = self.api_url(&format!("/items/{}?expanded=1", Self::encode(item_id)));
        let response = self
            .send(HttpRequest::get(url), self.read_retry.clone(), &format!("item {}", item_id))
            .await?;

        let item: LibraryItem = Self::parse(&response, "library item")?;
        let details = self.convert_item(item);

        info!(
            tracks = details.tracks.len(),
            audio_files = details.audio_files.len(),
            "Fetched item details"
        );
        Ok(details)
    }

    #[instrument(skip(self))]
    async fn start_session(&self, item_id: &str) -> Result<StartedSession> {
        let url = self.api_url(&format!("/items/{}/play", Self::encode(item_id)));
        let body = PlayRequest {
            device_info: DeviceInfo {
                device_id: self.device_id.clone(),
                client_name: self.client_name.clone(),
                client_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            supported_mime_types: SUPPORTED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
            media_player: self.client_name.clone(),
            force_direct_play: true,
        };

        let request = HttpRequest::post(url).json(&body)?;
        let response = self
            .send(request, RetryPolicy::none(), &format!("item {}", item_id))
            .await?;

        let session: PlaybackSessionResponse = Self::parse(&response, "playback session")?;
        info!(session_id = %session.id, "Session started");

        Ok(StartedSession {
            session_id: session.id,
            audio_tracks: session
                .audio_tracks
                .into_iter()
                .map(|track| self.convert_track(track))
                .collect(),
        })
    }

    #[instrument(skip(self, sync), fields(current_time = sync.current_time))]
    async fn sync_session(&self, session_id: &str, sync: SessionSync) -> Result<()> {
        let url = self.api_url(&format!("/session/{}/sync", Self::encode(session_id)));
        let request = HttpRequest::post(url).json(&Self::sync_body(sync))?;

        self.send(request, RetryPolicy::none(), &format!("session {}", session_id))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, sync))]
    async fn close_session(&self, session_id: &str, sync: Option<SessionSync>) -> Result<()> {
        let url = self.api_url(&format!("/session/{}/close", Self::encode(session_id)));
        let request = match sync {
            Some(sync) => HttpRequest::post(url).json(&Self::sync_body(sync))?,
            None => HttpRequest::post(url),
        };

        self.send(request, RetryPolicy::none(), &format!("session {}", session_id))
            .await?;
        info!("Session closed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_progress(&self, item_id: &str) -> Result<Option<f64>> {
        let url = self.api_url(&format!("/me/progress/{}", Self::encode(item_id)));
        let response = match self
            .send(HttpRequest::get(url), self.read_retry.clone(), &format!("progress {}", item_id))
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_not_found() => {
                debug!("No saved progress");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let progress: MediaProgress = Self::parse(&response, "media progress")?;
        debug!(
            current_time = progress.current_time,
            is_finished = progress.is_finished,
            "Loaded progress"
        );
        Ok(Some(progress.current_time))
    }

    #[instrument(skip(self, update), fields(current_time = update.current_time))]
    async fn save_progress(&self, item_id: &str, update: ProgressUpdate) -> Result<()> {
        let url = self.api_url(&format!("/me/progress/{}", Self::encode(item_id)));
        let body = ProgressRequest {
            current_time: update.current_time,
            duration: update.duration,
            progress: update.progress,
            is_finished: update.is_finished,
            last_update: update.last_update_ms,
        };
        let request = HttpRequest::patch(url).json(&body)?;

        self.send(request, RetryPolicy::none(), &format!("progress {}", item_id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::HttpMethod;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    const BASE: &str = "https://abs.example.com";

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn body_json(request: &HttpRequest) -> serde_json::Value {
        serde_json::from_slice(request.body.as_ref().unwrap()).unwrap()
    }

    fn connector(mock_http: MockHttpClient) -> AudiobookshelfConnector {
        AudiobookshelfConnector::new(Arc::new(mock_http), format!("{}/", BASE), "test_token")
            .with_device("device-1", "shelf-test")
            .with_read_retry(RetryPolicy::none())
    }

    #[test]
    fn test_resolve_url() {
        let connector = connector(MockHttpClient::new());

        assert_eq!(connector.base_url(), BASE);
        assert_eq!(
            connector.resolve_url("/api/items/li_1/file/7"),
            "https://abs.example.com/api/items/li_1/file/7"
        );
        assert_eq!(
            connector.resolve_url("api/items/li_1/file/7"),
            "https://abs.example.com/api/items/li_1/file/7"
        );
        assert_eq!(
            connector.resolve_url("https://cdn.example.com/a.mp3"),
            "https://cdn.example.com/a.mp3"
        );
    }

    #[tokio::test]
    async fn test_fetch_item_details_with_tracks() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Get);
            assert_eq!(req.url, "https://abs.example.com/api/items/li_1?expanded=1");
            assert_eq!(
                req.headers.get("Authorization"),
                Some(&"Bearer test_token".to_string())
            );

            Ok(response(
                200,
                r#"{
                    "id": "li_1",
                    "media": {
                        "metadata": { "title": "Dune" },
                        "duration": 150.0,
                        "tracks": [
                            { "index": 1, "startOffset": 0, "duration": 100.0,
                              "contentUrl": "/api/items/li_1/file/11", "mimeType": "audio/mp4" },
                            { "index": 2, "startOffset": 100.0, "duration": 50.0, "title": "Part 2",
                              "contentUrl": "/api/items/li_1/file/12" }
                        ]
                    }
                }"#,
            ))
        });

        let details = connector(mock_http).fetch_item_details("li_1").await.unwrap();

        assert_eq!(details.id, "li_1");
        assert_eq!(details.title, "Dune");
        assert_eq!(details.duration, Some(150.0));
        assert_eq!(details.tracks.len(), 2);
        assert_eq!(details.tracks[0].title, "Track 1");
        assert_eq!(details.tracks[0].mime_type, "audio/mp4");
        assert_eq!(
            details.tracks[1].content_url,
            "https://abs.example.com/api/items/li_1/file/12"
        );
        assert_eq!(details.tracks[1].mime_type, "audio/mpeg");
        assert!(details.audio_files.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_item_details_audio_files_only() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{
                    "id": "li_2",
                    "media": {
                        "metadata": { "title": "Split" },
                        "audioFiles": [
                            { "index": 1, "ino": "501", "duration": 60.0,
                              "metadata": { "filename": "a.mp3" }, "mimeType": "audio/mpeg" },
                            { "index": 2, "ino": "502" }
                        ]
                    }
                }"#,
            ))
        });

        let details = connector(mock_http).fetch_item_details("li_2").await.unwrap();

        assert!(details.tracks.is_empty());
        assert_eq!(details.audio_files.len(), 2);
        assert_eq!(details.audio_files[0].title, "a.mp3");
        assert_eq!(
            details.audio_files[0].content_url,
            "https://abs.example.com/api/items/li_2/file/501"
        );
        assert_eq!(details.audio_files[1].duration, 0.0);
    }

    #[tokio::test]
    async fn test_fetch_item_details_malformed_is_decode_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"id": 7}"#)));

        let err = connector(mock_http).fetch_item_details("li_1").await.unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_status() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, "Unauthorized")));

        let err = connector(mock_http).fetch_item_details("li_1").await.unwrap_err();
        assert!(matches!(err, BridgeError::Http { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_start_session_sends_device_info() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(req.url, "https://abs.example.com/api/items/li_1/play");
            let body = body_json(&req);
            assert_eq!(body["deviceInfo"]["deviceId"], "device-1");
            assert_eq!(body["deviceInfo"]["clientName"], "shelf-test");
            assert_eq!(body["forceDirectPlay"], true);
            assert!(body["supportedMimeTypes"].as_array().unwrap().len() > 1);

            Ok(response(
                200,
                r#"{
                    "id": "play_123",
                    "libraryItemId": "li_1",
                    "audioTracks": [
                        { "index": 1, "startOffset": 0, "duration": 100.0,
                          "contentUrl": "/api/items/li_1/file/11" }
                    ]
                }"#,
            ))
        });

        let session = connector(mock_http).start_session("li_1").await.unwrap();

        assert_eq!(session.session_id, "play_123");
        assert_eq!(session.audio_tracks.len(), 1);
        assert_eq!(
            session.audio_tracks[0].content_url,
            "https://abs.example.com/api/items/li_1/file/11"
        );
    }

    #[tokio::test]
    async fn test_sync_session_body() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://abs.example.com/api/session/play_123/sync");
            let body = body_json(&req);
            assert_eq!(body["currentTime"], 120.5);
            assert_eq!(body["timeListened"], 15.0);
            assert_eq!(body["duration"], 600.0);
            Ok(response(200, ""))
        });

        connector(mock_http)
            .sync_session(
                "play_123",
                SessionSync {
                    current_time: 120.5,
                    time_listened: 15.0,
                    duration: 600.0,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_session_without_sync_has_no_body() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://abs.example.com/api/session/play_123/close");
            assert!(req.body.is_none());
            Ok(response(200, ""))
        });

        connector(mock_http)
            .close_session("play_123", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_failure_surfaces_status() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(404, "Session not found")));

        let err = connector(mock_http)
            .sync_session(
                "expired",
                SessionSync {
                    current_time: 1.0,
                    time_listened: 1.0,
                    duration: 10.0,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_load_progress() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://abs.example.com/api/me/progress/li_1");
            Ok(response(
                200,
                r#"{ "id": "li_1-progress", "currentTime": 340.0, "progress": 0.2, "isFinished": false }"#,
            ))
        });

        let progress = connector(mock_http).load_progress("li_1").await.unwrap();
        assert_eq!(progress, Some(340.0));
    }

    #[tokio::test]
    async fn test_load_progress_not_found_is_none() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(404, "Not Found")));

        let progress = connector(mock_http).load_progress("li_new").await.unwrap();
        assert_eq!(progress, None);
    }

    #[tokio::test]
    async fn test_load_progress_server_error_propagates() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(500, "boom")));

        let err = connector(mock_http).load_progress("li_1").await.unwrap_err();
        assert!(matches!(err, BridgeError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_save_progress_patches_record() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Patch);
            assert_eq!(req.url, "https://abs.example.com/api/me/progress/li_1");
            let body = body_json(&req);
            assert_eq!(body["currentTime"], 594.0);
            assert_eq!(body["progress"], 0.99);
            assert_eq!(body["isFinished"], true);
            assert_eq!(body["lastUpdate"], 1_700_000_000_000i64);
            Ok(response(200, "{}"))
        });

        connector(mock_http)
            .save_progress(
                "li_1",
                ProgressUpdate {
                    current_time: 594.0,
                    duration: 600.0,
                    progress: 0.99,
                    is_finished: true,
                    last_update_ms: 1_700_000_000_000,
                },
            )
            .await
            .unwrap();
    }
}
