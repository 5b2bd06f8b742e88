//! Image fetching
//!
//! Works reference their images by URL; bytes are fetched once per work
//! per run and reused across that work's platform uploads.

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::{ImageData, ImageMime};

/// Derive a filename from an image URL, dropping any query string.
fn filename_from_url(url: &str) -> String {
    let name = url
        .rsplit('/')
        .next()
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("");

    if name.is_empty() || !name.contains('.') {
        "image.jpg".to_string()
    } else {
        name.to_string()
    }
}

fn mime_from_filename(filename: &str) -> ImageMime {
    filename
        .rsplit('.')
        .next()
        .and_then(ImageMime::from_extension)
        .unwrap_or(ImageMime::Jpeg)
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ImageData>;
}

/// Fetches image bytes over HTTP.
pub struct HttpImageSource {
    http: reqwest::Client,
}

impl HttpImageSource {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpImageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<ImageData> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("image fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PlatformError::Network(format!(
                "image fetch failed: {} returned {}",
                url,
                response.status()
            ))
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::Network(format!("image fetch failed: {}", e)))?
            .to_vec();

        let filename = filename_from_url(url);
        let mime = mime_from_filename(&filename);
        tracing::debug!("Fetched image: {} ({} bytes)", filename, bytes.len());

        Ok(ImageData {
            bytes,
            filename,
            mime,
        })
    }
}

/// Image source returning fixed bytes for any URL; for tests.
#[derive(Default)]
pub struct StaticImageSource {
    fetches: std::sync::atomic::AtomicUsize,
}

impl StaticImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for StaticImageSource {
    async fn fetch(&self, url: &str) -> Result<ImageData> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let filename = filename_from_url(url);
        let mime = mime_from_filename(&filename);
        Ok(ImageData {
            bytes: vec![0xff, 0xd8, 0xff, 0xd9],
            filename,
            mime,
        })
    }
}
