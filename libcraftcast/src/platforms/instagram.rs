//! Instagram platform implementation
//!
//! Publishes through the Instagram Graph API media container flow.
//! Container creation only accepts externally reachable image URLs, so
//! bytes are staged in the object store for the duration of the attempt.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::info;

use crate::config::InstagramConfig;
use crate::error::{PlatformError, RefreshError};
use crate::platforms::carousel::{self, ContainerApi, ContainerStatus};
use crate::platforms::{cleanup_staged, stage_images, PreparedPost, PublishClient};
use crate::storage::ObjectStore;
use crate::token::{SharedToken, TokenRefresher};
use crate::types::PlatformId;

const API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Instagram allows at most 10 images per carousel.
pub const MAX_CAROUSEL_IMAGES: usize = 10;

/// Long-lived Graph tokens are valid for 60 days when the refresh
/// response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_DAYS: i64 = 60;

pub struct InstagramClient {
    http: reqwest::Client,
    token: SharedToken,
    app_id: String,
    app_secret: String,
    business_account_id: String,
    store: Arc<dyn ObjectStore>,
}

impl InstagramClient {
    pub fn new(
        config: &InstagramConfig,
        app_secret: String,
        token: SharedToken,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            app_id: config.app_id.clone(),
            app_secret,
            business_account_id: config.business_account_id.clone(),
            store,
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<Value, PlatformError> {
        let url = format!("{}/{}", API_BASE, endpoint);
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("access_token", self.token.get()));

        let response = self
            .http
            .request(method, &url)
            .query(&query)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Network(format!("invalid Graph response: {}", e)))?;

        if let Some(error) = payload.get("error") {
            return Err(map_graph_error(error, endpoint));
        }
        Ok(payload)
    }

    fn container_id(payload: &Value, what: &str) -> std::result::Result<String, PlatformError> {
        payload["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Rejection(format!("{} response missing id", what)))
    }
}

/// Map a Graph API error object to a classified failure.
///
/// Code 190 is an invalid or expired token; transient platform faults
/// (code 1/2, `is_transient`) map to Network so only the poll loop
/// retries them; everything else is a rejection of this attempt.
fn map_graph_error(error: &Value, context: &str) -> PlatformError {
    let message = error["message"].as_str().unwrap_or("unknown error");
    let code = error["code"].as_i64().unwrap_or(0);
    let transient = error["is_transient"].as_bool().unwrap_or(false);

    let detail = format!("{} ({}, code {})", message, context, code);
    match code {
        190 => PlatformError::Auth(detail),
        1 | 2 => PlatformError::Network(detail),
        _ if transient => PlatformError::Network(detail),
        _ => PlatformError::Rejection(detail),
    }
}

#[async_trait]
impl ContainerApi for InstagramClient {
    async fn create_item(
        &self,
        image_url: &str,
        caption: Option<&str>,
        carousel_item: bool,
    ) -> std::result::Result<String, PlatformError> {
        let mut params = vec![("image_url", image_url.to_string())];
        if let Some(caption) = caption {
            params.push(("caption", caption.to_string()));
        }
        if carousel_item {
            params.push(("is_carousel_item", "true".to_string()));
        }

        let payload = self
            .request(
                reqwest::Method::POST,
                &format!("{}/media", self.business_account_id),
                &params,
            )
            .await?;
        let id = Self::container_id(&payload, "media container")?;
        info!("Created media container: {}", id);
        Ok(id)
    }

    async fn create_parent(
        &self,
        children: &[String],
        caption: &str,
    ) -> std::result::Result<String, PlatformError> {
        let payload = self
            .request(
                reqwest::Method::POST,
                &format!("{}/media", self.business_account_id),
                &[
                    ("media_type", "CAROUSEL".to_string()),
                    ("children", children.join(",")),
                    ("caption", caption.to_string()),
                ],
            )
            .await?;
        let id = Self::container_id(&payload, "carousel container")?;
        info!("Created carousel container: {}", id);
        Ok(id)
    }

    async fn status(
        &self,
        container_id: &str,
    ) -> std::result::Result<ContainerStatus, PlatformError> {
        let payload = self
            .request(
                reqwest::Method::GET,
                container_id,
                &[("fields", "status_code".to_string())],
            )
            .await?;

        Ok(match payload["status_code"].as_str() {
            Some("FINISHED") => ContainerStatus::Finished,
            Some("ERROR") => ContainerStatus::Error("media processing error".to_string()),
            _ => ContainerStatus::InProgress,
        })
    }

    async fn publish(&self, container_id: &str) -> std::result::Result<String, PlatformError> {
        let payload = self
            .request(
                reqwest::Method::POST,
                &format!("{}/media_publish", self.business_account_id),
                &[("creation_id", container_id.to_string())],
            )
            .await?;
        let post_id = Self::container_id(&payload, "publish")?;
        info!("Published media: {}", post_id);
        Ok(post_id)
    }
}

#[async_trait]
impl PublishClient for InstagramClient {
    fn id(&self) -> PlatformId {
        PlatformId::Instagram
    }

    fn max_images(&self) -> usize {
        MAX_CAROUSEL_IMAGES
    }

    async fn upload_and_publish(
        &self,
        post: &PreparedPost,
    ) -> std::result::Result<String, PlatformError> {
        let staged = stage_images(&self.store, &post.images).await?;
        let urls: Vec<String> = staged.iter().map(|(_, url)| url.clone()).collect();

        let result = carousel::publish_containers(self, &urls, &post.caption).await;

        // Container publishing waits for FINISHED before returning, so
        // the staged objects are no longer needed either way.
        cleanup_staged(&self.store, &staged).await;
        result
    }
}

#[async_trait]
impl TokenRefresher for InstagramClient {
    fn platform(&self) -> PlatformId {
        PlatformId::Instagram
    }

    fn token(&self) -> &SharedToken {
        &self.token
    }

    async fn exchange(
        &self,
        current: &str,
    ) -> std::result::Result<(String, DateTime<Utc>), RefreshError> {
        let url = format!("{}/oauth/access_token", API_BASE);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", &self.app_id),
                ("client_secret", &self.app_secret),
                ("fb_exchange_token", current),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Exchange(e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RefreshError::Exchange(format!("invalid refresh response: {}", e)))?;

        if let Some(error) = payload.get("error") {
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(RefreshError::Exchange(message.to_string()));
        }

        let token = payload["access_token"]
            .as_str()
            .ok_or_else(|| RefreshError::Exchange("response missing access_token".to_string()))?
            .to_string();

        let lifetime = payload["expires_in"]
            .as_i64()
            .map(Duration::seconds)
            .unwrap_or_else(|| Duration::days(DEFAULT_TOKEN_LIFETIME_DAYS));

        Ok((token, Utc::now() + lifetime))
    }
}
