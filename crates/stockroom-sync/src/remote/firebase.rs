//! # Firebase Realtime Database Client
//!
//! REST access plus the server-sent-event change stream.
//!
//! ## Endpoints
//! ```text
//! GET    {base}/products.json?auth=…          read
//! PUT    {base}/products/14.json?auth=…       set
//! PATCH  {base}/products/14.json?auth=…       update
//! DELETE {base}/products/14.json?auth=…       remove
//! GET    {base}/products.json  (Accept: text/event-stream)   change stream
//! ```
//!
//! ## Stream Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌────────────┐   200 OK    ┌────────────┐   chunk → frames → events    │
//! │  │ Connecting │ ──────────► │ Streaming  │ ─────────────────────────►   │
//! │  └─────┬──────┘             └─────┬──────┘                              │
//! │        │ error                    │ closed / retryable error            │
//! │        ▼                          ▼                                     │
//! │  ┌────────────────────────────────────────┐                             │
//! │  │ Backoff (500ms → … → max, no deadline) │ ──► Connecting              │
//! │  └────────────────────────────────────────┘                             │
//! │                                                                         │
//! │  undecodable put / patch frame     → error yielded, stream continues    │
//! │  cancel / auth_revoked / 401 / 403 → error yielded, stream ends         │
//! │  subscriber dropped                → task exits                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the transport reconnects. Individual reads and writes are never
//! retried; callers count failures and move on.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::remote::sse::{decode_frame, SseParser};
use crate::remote::{ChangeEvent, ChangeFeed, ChangeStream, Collection, RemotePath, RemoteStore};

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for one database instance.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Database root, e.g. `https://my-shop-default-rtdb.firebaseio.com/`.
    pub base_url: Url,

    /// Database secret or ID token, sent as the `auth` query parameter.
    pub auth_token: Option<String>,

    /// Timeout for REST requests (not applied to change streams).
    pub request_timeout: Duration,

    /// Initial reconnect delay for change streams.
    pub initial_backoff: Duration,

    /// Maximum reconnect delay for change streams.
    pub max_backoff: Duration,
}

impl FirebaseConfig {
    /// Parses the base URL. Only http(s) URLs are accepted.
    pub fn new(base_url: &str) -> SyncResult<Self> {
        let mut url = Url::parse(base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Remote URL must start with http:// or https://, got: {base_url}"
            )));
        }
        // Url::join replaces the last segment unless the base ends with '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(FirebaseConfig {
            base_url: url,
            auth_token: None,
            request_timeout: Duration::from_secs(15),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        })
    }

    pub fn auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }
}

// =============================================================================
// Client
// =============================================================================

/// REST + streaming client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FirebaseClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    config: Arc<FirebaseConfig>,
}

#[derive(Debug)]
enum StreamEnd {
    /// Server closed the response; reconnect.
    Closed,
    /// Nobody is listening any more.
    SubscriberGone,
}

impl FirebaseClient {
    pub fn new(config: FirebaseConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        // Streams stay open indefinitely; only the connect phase is bounded.
        let stream_http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(FirebaseClient {
            http,
            stream_http,
            config: Arc::new(config),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// `{base}/{path}.json?auth=…`
    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        let relative = RemotePath::new(path).as_str().trim_start_matches('/').to_string();
        let mut url = self.config.base_url.join(&format!("{relative}.json"))?;
        if let Some(token) = &self.config.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    async fn check(response: reqwest::Response, path: &str) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), path, body = %body, "Remote request rejected");
        Err(SyncError::HttpStatus {
            status: status.as_u16(),
            path: path.to_string(),
        })
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.config.initial_backoff,
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn open_stream(&self, collection: Collection) -> SyncResult<reqwest::Response> {
        let path = RemotePath::collection(collection);
        let url = self.endpoint(path.as_str())?;
        let response = self
            .stream_http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        Self::check(response, path.as_str()).await
    }

    /// Forwards events from one open response until it ends.
    async fn pump(
        mut response: reqwest::Response,
        tx: &mpsc::Sender<SyncResult<ChangeEvent>>,
    ) -> SyncResult<StreamEnd> {
        let mut parser = SseParser::new();

        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk?,
                _ = tx.closed() => return Ok(StreamEnd::SubscriberGone),
            };
            let Some(chunk) = chunk else {
                return Ok(StreamEnd::Closed);
            };

            if let Some(end) = Self::forward(&mut parser, &chunk, tx).await? {
                return Ok(end);
            }
        }
    }

    /// Sends the events completed by one chunk.
    ///
    /// A frame whose payload does not decode is passed on as
    /// `Err(InvalidEvent)` and later frames still flow; only `cancel` and
    /// `auth_revoked` end the stream.
    async fn forward(
        parser: &mut SseParser,
        chunk: &[u8],
        tx: &mpsc::Sender<SyncResult<ChangeEvent>>,
    ) -> SyncResult<Option<StreamEnd>> {
        for frame in parser.feed(chunk) {
            let item = match decode_frame(&frame) {
                Ok(Some(event)) => Ok(event),
                Ok(None) => continue,
                Err(e @ SyncError::InvalidEvent(_)) => {
                    warn!(event = %frame.event, error = %e, "Undecodable stream frame");
                    Err(e)
                }
                Err(e) => return Err(e),
            };
            if tx.send(item).await.is_err() {
                return Ok(Some(StreamEnd::SubscriberGone));
            }
        }
        Ok(None)
    }

    /// Background task behind one subscription.
    async fn run_stream(self, collection: Collection, tx: mpsc::Sender<SyncResult<ChangeEvent>>) {
        info!(%collection, "Change stream starting");
        let mut backoff = self.create_backoff();

        loop {
            let outcome = match self.open_stream(collection).await {
                Ok(response) => {
                    debug!(%collection, "Change stream connected");
                    backoff.reset();
                    Self::pump(response, &tx).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(StreamEnd::SubscriberGone) => break,
                Ok(StreamEnd::Closed) => warn!(%collection, "Change stream closed by server"),
                Err(e) if e.is_retryable() => warn!(%collection, error = %e, "Change stream dropped"),
                Err(e) => {
                    warn!(%collection, error = %e, "Change stream failed permanently");
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }

            let Some(delay) = backoff.next_backoff() else {
                break;
            };
            debug!(%collection, ?delay, "Waiting before reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = tx.closed() => break,
            }
        }

        info!(%collection, "Change stream stopped");
    }
}

#[async_trait]
impl RemoteStore for FirebaseClient {
    async fn get(&self, path: &str) -> SyncResult<Option<Value>> {
        let response = self.http.get(self.endpoint(path)?).send().await?;
        let value: Value = Self::check(response, path).await?.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &str, value: &Value) -> SyncResult<()> {
        let response = self.http.put(self.endpoint(path)?).json(value).send().await?;
        Self::check(response, path).await?;
        debug!(path, "Remote set");
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Map<String, Value>) -> SyncResult<()> {
        let response = self.http.patch(self.endpoint(path)?).json(fields).send().await?;
        Self::check(response, path).await?;
        debug!(path, fields = fields.len(), "Remote update");
        Ok(())
    }

    async fn remove(&self, path: &str) -> SyncResult<()> {
        let response = self.http.delete(self.endpoint(path)?).send().await?;
        Self::check(response, path).await?;
        debug!(path, "Remote remove");
        Ok(())
    }
}

impl ChangeFeed for FirebaseClient {
    /// Spawns the stream task; must be called inside a Tokio runtime.
    fn subscribe(&self, collection: Collection) -> ChangeStream {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(self.clone().run_stream(collection, tx));
        ReceiverStream::new(rx).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_non_http() {
        assert!(FirebaseConfig::new("ws://example.com").is_err());
        assert!(FirebaseConfig::new("not a url").is_err());
        assert!(FirebaseConfig::new("https://shop.firebaseio.com").is_ok());
    }

    #[test]
    fn test_endpoint_building() {
        let config = FirebaseConfig::new("https://shop.firebaseio.com/db")
            .unwrap()
            .auth_token(Some("s3cret".into()));
        let client = FirebaseClient::new(config).unwrap();

        assert_eq!(
            client.endpoint("/products/14").unwrap().as_str(),
            "https://shop.firebaseio.com/db/products/14.json?auth=s3cret"
        );
        assert_eq!(
            client.endpoint(RemotePath::BACKUP).unwrap().as_str(),
            "https://shop.firebaseio.com/db/backups/inventory_db.json?auth=s3cret"
        );
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let config = FirebaseConfig::new("https://shop.firebaseio.com/")
            .unwrap()
            .auth_token(Some(String::new()));
        let client = FirebaseClient::new(config).unwrap();
        assert_eq!(
            client.endpoint("sales").unwrap().as_str(),
            "https://shop.firebaseio.com/sales.json"
        );
    }

    #[tokio::test]
    async fn test_bad_frame_does_not_end_the_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut parser = SseParser::new();

        let chunk = b"event: put\ndata: {\"data\":{\"name\":\"Rice\"}}\n\n\
                      event: put\ndata: {\"path\":\"/7\",\"data\":{\"quantity\":4}}\n\n";
        let end = FirebaseClient::forward(&mut parser, chunk, &tx).await.unwrap();
        assert!(end.is_none());

        assert!(matches!(rx.recv().await, Some(Err(SyncError::InvalidEvent(_)))));
        let event = rx.recv().await.unwrap().unwrap();
        assert_eq!(event.path, "/7");

        let chunk = b"event: patch\ndata: {\"path\":\"/7\",\"data\":{\"quantity\":3}}\n\n";
        assert!(FirebaseClient::forward(&mut parser, chunk, &tx).await.unwrap().is_none());
        assert_eq!(rx.recv().await.unwrap().unwrap().path, "/7");
    }

    #[tokio::test]
    async fn test_cancel_frame_ends_the_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut parser = SseParser::new();

        let chunk = b"event: cancel\ndata: permission denied\n\n";
        let err = FirebaseClient::forward(&mut parser, chunk, &tx).await.unwrap_err();
        assert!(matches!(err, SyncError::StreamCancelled(_)));
        assert!(!err.is_retryable());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_stops_forwarding() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut parser = SseParser::new();

        let chunk = b"event: put\ndata: {\"path\":\"/\",\"data\":null}\n\n";
        let end = FirebaseClient::forward(&mut parser, chunk, &tx).await.unwrap();
        assert!(matches!(end, Some(StreamEnd::SubscriberGone)));
    }

    #[test]
    fn test_backoff_is_unbounded() {
        let config = FirebaseConfig::new("https://shop.firebaseio.com/")
            .unwrap()
            .backoff(Duration::from_millis(100), Duration::from_secs(2));
        let client = FirebaseClient::new(config).unwrap();
        let mut backoff = client.create_backoff();
        for _ in 0..50 {
            let delay = backoff.next_backoff().unwrap();
            assert!(delay <= Duration::from_secs(3));
        }
    }
}
