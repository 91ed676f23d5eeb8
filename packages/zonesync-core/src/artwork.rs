//! Artwork resolution.
//!
//! A track's `artwork_ref` is an opaque handle. Displays fetch
//! `/artwork/{artwork_ref}` and the server hands the ref to an
//! [`ArtworkResolver`], which returns image bytes. No caching or
//! transcoding happens here.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

/// Image bytes plus their content type.
#[derive(Debug, Clone)]
pub struct Artwork {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Resolves an artwork ref to image bytes.
///
/// Returns `None` when the ref cannot be resolved; the HTTP layer turns that
/// into a 404.
#[async_trait]
pub trait ArtworkResolver: Send + Sync {
    async fn resolve(&self, artwork_ref: &str) -> Option<Artwork>;
}

/// Resolver that never finds anything.
pub struct NoArtwork;

#[async_trait]
impl ArtworkResolver for NoArtwork {
    async fn resolve(&self, _artwork_ref: &str) -> Option<Artwork> {
        None
    }
}

/// Pass-through resolver that fetches `{base_url}/{artwork_ref}`.
pub struct HttpArtworkResolver {
    client: Client,
    base_url: String,
}

impl HttpArtworkResolver {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds the upstream URL, or `None` for refs that would escape the base.
    fn url_for(&self, artwork_ref: &str) -> Option<String> {
        let artwork_ref = artwork_ref.trim_start_matches('/');
        if artwork_ref.is_empty()
            || artwork_ref.contains("..")
            || artwork_ref.contains("://")
            || artwork_ref.chars().any(char::is_control)
        {
            return None;
        }
        Some(format!("{}/{}", self.base_url, artwork_ref))
    }
}

#[async_trait]
impl ArtworkResolver for HttpArtworkResolver {
    async fn resolve(&self, artwork_ref: &str) -> Option<Artwork> {
        let url = self.url_for(artwork_ref)?;

        let response = match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::warn!("[Artwork] Fetch failed for {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            log::debug!("[Artwork] {} returned {}", url, response.status());
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        match response.bytes().await {
            Ok(bytes) => Some(Artwork {
                content_type,
                bytes,
            }),
            Err(e) => {
                log::warn!("[Artwork] Reading body of {} failed: {}", url, e);
                None
            }
        }
    }
}
