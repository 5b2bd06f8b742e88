//! X platform implementation
//!
//! Direct-post variant: media bytes upload straight to the platform,
//! then one tweet-create call references the uploaded ids. No container
//! lifecycle and no polling.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::PlatformError;
use crate::platforms::{PreparedPost, PublishClient};
use crate::token::SharedToken;
use crate::types::PlatformId;

const UPLOAD_URL: &str = "https://api.x.com/2/media/upload";
const TWEETS_URL: &str = "https://api.x.com/2/tweets";

/// X allows at most 4 images per post.
pub const MAX_IMAGES: usize = 4;

pub struct XClient {
    http: reqwest::Client,
    token: SharedToken,
}

impl XClient {
    pub fn new(token: SharedToken) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
        }
    }

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime: &str,
    ) -> std::result::Result<String, PlatformError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|e| PlatformError::Rejection(format!("invalid media type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(self.token.get())
            .query(&[("media_category", "tweet_image")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let payload = check_response(response, "media upload").await?;

        let media_id = payload["data"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Rejection("media upload response missing id".to_string())
            })?;
        info!("Uploaded media: {}", media_id);
        Ok(media_id)
    }

    async fn create_tweet(
        &self,
        text: &str,
        media_ids: &[String],
    ) -> std::result::Result<String, PlatformError> {
        let response = self
            .http
            .post(TWEETS_URL)
            .bearer_auth(self.token.get())
            .json(&json!({
                "text": text,
                "media": { "media_ids": media_ids },
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let payload = check_response(response, "tweet create").await?;

        let tweet_id = payload["data"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Rejection("tweet response missing id".to_string())
            })?;
        info!("Posted tweet: {}", tweet_id);
        Ok(tweet_id)
    }
}

async fn check_response(
    response: reqwest::Response,
    context: &str,
) -> std::result::Result<Value, PlatformError> {
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| PlatformError::Network(format!("invalid X response: {}", e)))?;

    if status.is_success() {
        return Ok(payload);
    }

    let message = payload["detail"]
        .as_str()
        .or_else(|| payload["errors"][0]["message"].as_str())
        .or_else(|| payload["title"].as_str())
        .unwrap_or("unknown error");
    let detail = format!("{} ({}, status {})", message, context, status.as_u16());

    Err(match status.as_u16() {
        401 | 403 => PlatformError::Auth(detail),
        429 | 500..=599 => PlatformError::Network(detail),
        _ => PlatformError::Rejection(detail),
    })
}

#[async_trait]
impl PublishClient for XClient {
    fn id(&self) -> PlatformId {
        PlatformId::X
    }

    fn max_images(&self) -> usize {
        MAX_IMAGES
    }

    async fn upload_and_publish(
        &self,
        post: &PreparedPost,
    ) -> std::result::Result<String, PlatformError> {
        // The planner chunks works to the cap upstream; guard anyway so a
        // wire call never carries an over-limit payload.
        let images = &post.images[..post.images.len().min(MAX_IMAGES)];
        if images.len() < post.images.len() {
            warn!(
                "X post truncated to {} of {} images",
                images.len(),
                post.images.len()
            );
        }

        let mut media_ids = Vec::with_capacity(images.len());
        for image in images {
            let media_id = self
                .upload_media(image.bytes.clone(), &image.filename, image.mime.as_str())
                .await?;
            media_ids.push(media_id);
        }

        self.create_tweet(&post.caption, &media_ids).await
    }
}
