//! Request/response access to the camera registry and density log.
//!
//! Only the two lookups the monitoring view needs are implemented: the camera
//! by id, and its recent density history used to seed the chart.
//!
//! ## Example
//!
//! ```rust,no_run
//! use crowdwatch::api::{ApiClient, AuthContext};
//!
//! # tokio_test::block_on(async {
//! let client = ApiClient::builder()
//!     .base_url("http://localhost:5000")
//!     .auth(AuthContext::bearer("token"))
//!     .build()?;
//!
//! let camera = client.fetch_camera("cam-1").await?;
//! let history = client.fetch_density_history(&camera.id, 60).await?;
//! println!("{}: {} samples", camera.name, history.len());
//! # Ok::<(), crowdwatch::api::ApiError>(())
//! # });
//! ```

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::data::{parse_timestamp, CameraRef, DensityReading, DensitySample};

/// Errors from the REST collaborators.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The client could not be configured.
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Connection(err.to_string())
        } else {
            ApiError::Http(err.to_string())
        }
    }
}

/// Credentials passed explicitly to whatever needs them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    token: Option<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: (!token.trim().is_empty()).then_some(token),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Client for the camera and monitoring endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    auth: AuthContext,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Look up a registered camera.
    pub async fn fetch_camera(&self, camera_id: &str) -> Result<CameraRef, ApiError> {
        let url = self.camera_url(camera_id)?;
        let body: CameraResponse = self.get_json(url, &format!("Camera {camera_id}")).await?;
        Ok(body.camera)
    }

    /// Density samples logged for `camera_id` in the last `minutes`, oldest first.
    pub async fn fetch_density_history(
        &self,
        camera_id: &str,
        minutes: u32,
    ) -> Result<Vec<DensitySample>, ApiError> {
        let url = self.history_url(camera_id, minutes)?;
        let body: HistoryResponse = self.get_json(url, &format!("Camera {camera_id}")).await?;
        Ok(body.into_samples())
    }

    fn camera_url(&self, camera_id: &str) -> Result<Url, ApiError> {
        self.endpoint(&["api", "cameras", camera_id])
    }

    fn history_url(&self, camera_id: &str, minutes: u32) -> Result<Url, ApiError> {
        let mut url = self.endpoint(&["api", "monitoring", "density", camera_id])?;
        url.query_pairs_mut()
            .append_pair("minutes", &minutes.to_string());
        Ok(url)
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url, what: &str) -> Result<T, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!(%url, "GET");
        let response = self.auth.apply(self.client.get(url.clone())).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::Auth(format!("{} for {url}", response.status())));
            }
            StatusCode::NOT_FOUND => return Err(ApiError::NotFound(what.to_string())),
            status if !status.is_success() => {
                return Err(ApiError::Http(format!("API returned status {status}")));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    auth: AuthContext,
    timeout: Option<Duration>,
}

impl ApiClientBuilder {
    /// Set the API base URL (default: `http://localhost:5000`).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client. Fails on an unusable base URL or HTTP client setup.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        let raw = self.base_url.as_deref().unwrap_or("http://localhost:5000");
        let base_url =
            Url::parse(raw).map_err(|e| ApiError::Config(format!("invalid base URL {raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Config(format!("{raw} cannot be a base URL")));
        }

        Ok(ApiClient {
            client,
            base_url,
            auth: self.auth,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CameraResponse {
    camera: CameraRef,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    logs: Vec<DensityLog>,
}

/// One row of the density log.
#[derive(Debug, Deserialize)]
struct DensityLog {
    timestamp: String,
    #[serde(default)]
    person_count: u32,
    #[serde(default)]
    density_value: f64,
    #[serde(default)]
    density_per_sqm: f64,
}

impl HistoryResponse {
    fn into_samples(self) -> Vec<DensitySample> {
        let mut samples: Vec<DensitySample> = self
            .logs
            .into_iter()
            .filter_map(|log| {
                let Some(timestamp) = parse_timestamp(&log.timestamp) else {
                    debug!(timestamp = %log.timestamp, "skipping log with bad timestamp");
                    return None;
                };
                Some(DensitySample::at(
                    timestamp,
                    DensityReading {
                        person_count: log.person_count,
                        density_value: log.density_value,
                        density_per_sqm: log.density_per_sqm,
                    },
                ))
            })
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn builder_defaults() {
        let client = ApiClient::builder().build().unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:5000/");
        assert!(!client.auth.is_authenticated());
    }

    #[test]
    fn urls_are_built_from_base() {
        let client = ApiClient::builder()
            .base_url("http://api.local/")
            .build()
            .unwrap();
        assert_eq!(
            client.camera_url("cam-1").unwrap().as_str(),
            "http://api.local/api/cameras/cam-1"
        );
        assert_eq!(
            client.history_url("a/b", 60).unwrap().as_str(),
            "http://api.local/api/monitoring/density/a%2Fb?minutes=60"
        );

        let prefixed = ApiClient::builder()
            .base_url("http://gateway.local/crowd")
            .build()
            .unwrap();
        assert_eq!(
            prefixed.camera_url("cam-1").unwrap().as_str(),
            "http://gateway.local/crowd/api/cameras/cam-1"
        );
    }

    #[test]
    fn camera_ids_are_escaped_as_one_segment() {
        let client = ApiClient::builder().build().unwrap();
        let url = client.camera_url("lobby?x=1#top 2%").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/cameras/lobby%3Fx=1%23top%202%25"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let url = client.history_url("a#b", 5).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/monitoring/density/a%23b?minutes=5"
        );
    }

    #[test]
    fn unusable_base_url_fails_the_build() {
        assert!(matches!(
            ApiClient::builder().base_url("not a url").build(),
            Err(ApiError::Config(_))
        ));
        assert!(matches!(
            ApiClient::builder().base_url("mailto:ops@example.org").build(),
            Err(ApiError::Config(_))
        ));
    }

    #[tokio::test]
    async fn configured_timeout_is_applied() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer.
        let silent = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = ApiClient::builder()
            .base_url(format!("http://{addr}"))
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), client.fetch_camera("cam-1"))
            .await
            .unwrap();

        assert!(matches!(result, Err(ApiError::Timeout)));
        silent.abort();
    }

    #[test]
    fn blank_token_is_anonymous() {
        assert!(!AuthContext::bearer("  ").is_authenticated());
        assert!(AuthContext::bearer("abc").is_authenticated());
        assert!(!format!("{:?}", AuthContext::bearer("secret")).contains("secret"));
    }

    #[test]
    fn history_is_sorted_and_skips_bad_rows() {
        let body: HistoryResponse = serde_json::from_str(
            r#"{
                "camera_id": "cam-1",
                "logs": [
                    {"id": "b", "timestamp": "2024-05-01T12:00:10", "person_count": 4, "density_value": 0.2, "alert_triggered": false},
                    {"id": "x", "timestamp": "yesterday", "person_count": 1, "density_value": 0.1},
                    {"id": "a", "timestamp": "2024-05-01T12:00:00.250000", "person_count": 2, "density_value": 0.1, "alert_triggered": true}
                ]
            }"#,
        )
        .unwrap();

        let samples = body.into_samples();
        let counts: Vec<u32> = samples.iter().map(|s| s.person_count).collect();
        assert_eq!(counts, vec![2, 4]);
        assert_eq!(samples[0].density_per_sqm, 0.0);
    }

    #[tokio::test]
    async fn fetch_camera_sends_bearer_token() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"camera": {"id": "cam-1", "name": "Lobby", "url": "rtsp://x", "location": "Hall A"}}"#,
        )
        .await;
        let client = ApiClient::builder()
            .base_url(base)
            .auth(AuthContext::bearer("t0ken"))
            .build()
            .unwrap();

        let camera = client.fetch_camera("cam-1").await.unwrap();
        assert_eq!(camera.name, "Lobby");
        assert_eq!(camera.location, "Hall A");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/cameras/cam-1 "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer t0ken"));
    }

    #[tokio::test]
    async fn missing_camera_is_not_found() {
        let (base, _server) = serve_once("404 Not Found", r#"{"error": "Camera not found"}"#).await;
        let client = ApiClient::builder().base_url(base).build().unwrap();

        let err = client.fetch_camera("nope").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn unauthorized_is_auth_error() {
        let (base, _server) = serve_once("401 Unauthorized", r#"{"error": "Token is missing"}"#).await;
        let client = ApiClient::builder().base_url(base).build().unwrap();

        let err = client.fetch_density_history("cam-1", 60).await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[tokio::test]
    async fn fetch_history_requests_window() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"camera_id": "cam-1", "logs": [{"id": "1", "timestamp": "2024-05-01T12:00:00", "person_count": 9, "density_value": 0.3, "alert_triggered": false}]}"#,
        )
        .await;
        let client = ApiClient::builder().base_url(base).build().unwrap();

        let samples = client.fetch_density_history("cam-1", 15).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].person_count, 9);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/monitoring/density/cam-1?minutes=15 "));
    }
}
