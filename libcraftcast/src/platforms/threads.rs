//! Threads platform implementation
//!
//! The Threads Graph API mirrors the Instagram container flow with JSON
//! request bodies and a few quirks of its own: freshly created or
//! published containers can transiently report "not available" (code 24),
//! and media is downloaded asynchronously even after publish, so staged
//! objects must outlive the publish call by a grace period.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::ThreadsConfig;
use crate::error::{PlatformError, RefreshError};
use crate::platforms::carousel::{self, ContainerApi, ContainerStatus};
use crate::platforms::{cleanup_staged, stage_images, PreparedPost, PublishClient};
use crate::storage::ObjectStore;
use crate::token::{SharedToken, TokenRefresher};
use crate::types::PlatformId;

const API_BASE: &str = "https://graph.threads.net/v1.0";
const REFRESH_BASE: &str = "https://graph.threads.net";

/// Threads allows at most 20 images per carousel.
pub const MAX_CAROUSEL_IMAGES: usize = 20;

/// Threads reports a just-created resource as missing with this code.
const CODE_NOT_AVAILABLE: i64 = 24;

const PUBLISH_ATTEMPTS: usize = 5;
const PUBLISH_RETRY_INTERVAL: StdDuration = StdDuration::from_secs(2);

/// Threads fetches media asynchronously after publish; staged objects
/// must stay reachable this long before cleanup.
const IMAGE_DOWNLOAD_GRACE: StdDuration = StdDuration::from_secs(20);

const DEFAULT_TOKEN_LIFETIME_DAYS: i64 = 60;

/// API failure with the platform error code preserved, so callers can
/// recognize the transient not-available condition.
struct ApiError {
    code: Option<i64>,
    error: PlatformError,
}

pub struct ThreadsClient {
    http: reqwest::Client,
    token: SharedToken,
    user_id: String,
    store: Arc<dyn ObjectStore>,
}

impl ThreadsClient {
    pub fn new(config: &ThreadsConfig, token: SharedToken, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            user_id: config.user_id.clone().unwrap_or_else(|| "me".to_string()),
            store,
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> std::result::Result<Value, ApiError> {
        let url = format!("{}/{}", API_BASE, endpoint);
        let mut query: Vec<(&str, String)> = query.to_vec();
        query.push(("access_token", self.token.get()));

        let mut request = self.http.request(method, &url).query(&query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| ApiError {
            code: None,
            error: PlatformError::Network(e.to_string()),
        })?;

        let payload: Value = response.json().await.map_err(|e| ApiError {
            code: None,
            error: PlatformError::Network(format!("invalid Threads response: {}", e)),
        })?;

        if let Some(error) = payload.get("error") {
            let code = error["code"].as_i64();
            return Err(ApiError {
                code,
                error: map_threads_error(error, endpoint),
            });
        }
        Ok(payload)
    }

    fn response_id(payload: &Value, what: &str) -> std::result::Result<String, PlatformError> {
        payload["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Rejection(format!("{} response missing id", what)))
    }
}

fn map_threads_error(error: &Value, context: &str) -> PlatformError {
    let message = error["message"].as_str().unwrap_or("unknown error");
    let code = error["code"].as_i64().unwrap_or(0);

    let detail = format!("{} ({}, code {})", message, context, code);
    match code {
        190 => PlatformError::Auth(detail),
        1 | 2 => PlatformError::Network(detail),
        _ => PlatformError::Rejection(detail),
    }
}

#[async_trait]
impl ContainerApi for ThreadsClient {
    async fn create_item(
        &self,
        image_url: &str,
        caption: Option<&str>,
        carousel_item: bool,
    ) -> std::result::Result<String, PlatformError> {
        let mut body = json!({
            "media_type": "IMAGE",
            "image_url": image_url,
        });
        if carousel_item {
            body["is_carousel_item"] = json!(true);
        } else if let Some(caption) = caption {
            // Caption belongs on the carousel container, not on items.
            body["text"] = json!(caption);
        }

        let payload = self
            .request(
                reqwest::Method::POST,
                &format!("{}/threads", self.user_id),
                &[],
                Some(body),
            )
            .await
            .map_err(|e| e.error)?;
        let id = Self::response_id(&payload, "image container")?;
        info!("Created Threads container: {}", id);
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
                &format!("{}/threads", self.user_id),
                &[],
                Some(json!({
                    "media_type": "CAROUSEL",
                    "children": children,
                    "text": caption,
                })),
            )
            .await
            .map_err(|e| e.error)?;
        let id = Self::response_id(&payload, "carousel container")?;
        info!("Created Threads carousel container: {}", id);
        Ok(id)
    }

    async fn status(
        &self,
        container_id: &str,
    ) -> std::result::Result<ContainerStatus, PlatformError> {
        let result = self
            .request(
                reqwest::Method::GET,
                container_id,
                &[("fields", "id,status,error_message".to_string())],
                None,
            )
            .await;

        let payload = match result {
            Ok(payload) => payload,
            // Not visible yet; the bounded poll loop keeps waiting.
            Err(e) if e.code == Some(CODE_NOT_AVAILABLE) => {
                return Ok(ContainerStatus::InProgress)
            }
            Err(e) => return Err(e.error),
        };

        Ok(match payload["status"].as_str() {
            Some("FINISHED") => ContainerStatus::Finished,
            Some("ERROR") => {
                let message = payload["error_message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string();
                ContainerStatus::Error(message)
            }
            Some("EXPIRED") | Some("DELETED") => {
                ContainerStatus::Error("container expired or deleted".to_string())
            }
            _ => ContainerStatus::InProgress,
        })
    }

    async fn publish(&self, container_id: &str) -> std::result::Result<String, PlatformError> {
        for attempt in 1..=PUBLISH_ATTEMPTS {
            let result = self
                .request(
                    reqwest::Method::POST,
                    &format!("{}/threads_publish", self.user_id),
                    &[],
                    Some(json!({ "creation_id": container_id })),
                )
                .await;

            match result {
                Ok(payload) => {
                    let post_id = Self::response_id(&payload, "publish")?;
                    info!("Published Threads media: {}", post_id);
                    return Ok(post_id);
                }
                Err(e) if e.code == Some(CODE_NOT_AVAILABLE) && attempt < PUBLISH_ATTEMPTS => {
                    warn!(
                        "Threads publish not ready for {} (attempt {}/{})",
                        container_id, attempt, PUBLISH_ATTEMPTS
                    );
                    sleep(PUBLISH_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e.error),
            }
        }
        Err(PlatformError::Timeout(format!(
            "container {} not publishable after {} attempts",
            container_id, PUBLISH_ATTEMPTS
        )))
    }
}

#[async_trait]
impl PublishClient for ThreadsClient {
    fn id(&self) -> PlatformId {
        PlatformId::Threads
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

        if result.is_ok() {
            info!(
                "Waiting {}s for Threads to download media",
                IMAGE_DOWNLOAD_GRACE.as_secs()
            );
            sleep(IMAGE_DOWNLOAD_GRACE).await;
        }

        cleanup_staged(&self.store, &staged).await;
        result
    }
}

#[async_trait]
impl TokenRefresher for ThreadsClient {
    fn platform(&self) -> PlatformId {
        PlatformId::Threads
    }

    fn token(&self) -> &SharedToken {
        &self.token
    }

    async fn exchange(
        &self,
        current: &str,
    ) -> std::result::Result<(String, DateTime<Utc>), RefreshError> {
        let url = format!("{}/refresh_access_token", REFRESH_BASE);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("grant_type", "th_refresh_token"),
                ("access_token", current),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_threads_error_auth() {
        let error = json!({ "message": "Invalid access token", "code": 190 });
        assert!(matches!(
            map_threads_error(&error, "threads"),
            PlatformError::Auth(_)
        ));
    }

    #[test]
    fn test_map_threads_error_rejection_carries_context() {
        let error = json!({ "message": "Invalid parameter", "code": 100 });
        match map_threads_error(&error, "threads_publish") {
            PlatformError::Rejection(msg) => {
                assert!(msg.contains("Invalid parameter"));
                assert!(msg.contains("threads_publish"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
