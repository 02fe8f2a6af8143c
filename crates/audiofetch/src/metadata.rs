//! Best-effort title and thumbnail lookup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Title used when the lookup fails.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Metadata request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Metadata response has no title")]
    MissingTitle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnail: Option<String>,
}

impl VideoMetadata {
    /// True for the fallback produced when the lookup failed.
    pub fn is_placeholder(&self) -> bool {
        self.title == UNKNOWN_TITLE
    }
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            thumbnail: None,
        }
    }
}

/// Resolves descriptive metadata for a video identifier. Never fails:
/// implementations fall back to [`VideoMetadata::default`].
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, identifier: &str) -> VideoMetadata;
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

/// Looks metadata up through the platform's public oEmbed endpoint.
#[derive(Debug, Clone)]
pub struct OEmbedResolver {
    client: Client,
    endpoint: String,
}

impl OEmbedResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(MetadataError::Client)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn fetch(&self, identifier: &str) -> Result<VideoMetadata, MetadataError> {
        let watch_url = format!("https://www.youtube.com/watch?v={}", identifier);
        let response: OEmbedResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let title = response
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(MetadataError::MissingTitle)?;

        Ok(VideoMetadata {
            title,
            thumbnail: response
                .thumbnail_url
                .or_else(|| Some(default_thumbnail(identifier))),
        })
    }
}

#[async_trait]
impl MetadataResolver for OEmbedResolver {
    async fn resolve(&self, identifier: &str) -> VideoMetadata {
        match self.fetch(identifier).await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Metadata lookup for {} failed: {}", identifier, e);
                VideoMetadata::default()
            }
        }
    }
}

/// Returns the same metadata for every identifier. Used when lookups are
/// disabled and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    metadata: VideoMetadata,
}

impl StaticMetadata {
    pub fn new(metadata: VideoMetadata) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl MetadataResolver for StaticMetadata {
    async fn resolve(&self, _identifier: &str) -> VideoMetadata {
        self.metadata.clone()
    }
}

fn default_thumbnail(identifier: &str) -> String {
    format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves a single HTTP response and returns the endpoint URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/oembed", addr)
    }

    #[tokio::test]
    async fn test_resolves_title_and_thumbnail() {
        let endpoint = serve_once(
            "200 OK",
            r#"{"title":"Never Gonna Give You Up","thumbnail_url":"https://i.ytimg.com/vi/x/hq.jpg"}"#,
        )
        .await;
        let resolver = OEmbedResolver::new(endpoint, Duration::from_secs(5)).unwrap();

        let metadata = resolver.resolve("dQw4w9WgXcQ").await;
        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(
            metadata.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/x/hq.jpg")
        );
        assert!(!metadata.is_placeholder());
    }

    #[tokio::test]
    async fn test_missing_thumbnail_uses_default() {
        let endpoint = serve_once("200 OK", r#"{"title":"Song"}"#).await;
        let resolver = OEmbedResolver::new(endpoint, Duration::from_secs(5)).unwrap();

        let metadata = resolver.resolve("dQw4w9WgXcQ").await;
        assert_eq!(
            metadata.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
        );
    }

    #[tokio::test]
    async fn test_http_error_falls_back_to_placeholder() {
        let endpoint = serve_once("404 Not Found", r#"{}"#).await;
        let resolver = OEmbedResolver::new(endpoint, Duration::from_secs(5)).unwrap();

        let metadata = resolver.resolve("dQw4w9WgXcQ").await;
        assert_eq!(metadata, VideoMetadata::default());
        assert!(metadata.is_placeholder());
    }

    #[tokio::test]
    async fn test_empty_title_falls_back_to_placeholder() {
        let endpoint = serve_once("200 OK", r#"{"title":"  "}"#).await;
        let resolver = OEmbedResolver::new(endpoint, Duration::from_secs(5)).unwrap();

        assert_eq!(resolver.resolve("dQw4w9WgXcQ").await.title, UNKNOWN_TITLE);
    }

    #[tokio::test]
    async fn test_static_metadata() {
        let resolver = StaticMetadata::new(VideoMetadata {
            title: "Fixed".to_string(),
            thumbnail: None,
        });
        assert_eq!(resolver.resolve("anything").await.title, "Fixed");
        assert!(StaticMetadata::default().resolve("x").await.is_placeholder());
    }
}
