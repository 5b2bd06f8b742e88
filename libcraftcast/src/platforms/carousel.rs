//! Shared carousel container lifecycle
//!
//! Instagram and Threads publish through the same asynchronous container
//! state machine: create a child container per image, poll each until the
//! platform finishes processing, assemble a parent container, publish.
//! The lifecycle lives here once, over a small per-platform wire trait.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::PlatformError;

/// Fixed poll interval for container status.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Hard bound on waiting for a single container to finish processing.
pub const MAX_WAIT: Duration = Duration::from_secs(60);

/// Platform-reported processing state of a media container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    InProgress,
    Finished,
    /// Processing failed; carries the platform's error message.
    Error(String),
}

/// Wire operations a carousel platform must provide.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Create a container for one image. `caption` is set only on
    /// standalone (non-carousel-item) containers.
    async fn create_item(
        &self,
        image_url: &str,
        caption: Option<&str>,
        carousel_item: bool,
    ) -> std::result::Result<String, PlatformError>;

    /// Create the parent carousel container over finished children.
    async fn create_parent(
        &self,
        children: &[String],
        caption: &str,
    ) -> std::result::Result<String, PlatformError>;

    async fn status(
        &self,
        container_id: &str,
    ) -> std::result::Result<ContainerStatus, PlatformError>;

    /// Publish a finished container, returning the post id.
    async fn publish(&self, container_id: &str) -> std::result::Result<String, PlatformError>;
}

/// Poll a container until `FINISHED`, bounded by [`MAX_WAIT`].
///
/// Transient network errors are retried here and only here; a status of
/// `ERROR` fails immediately; exceeding the bound is a timeout, never a
/// success.
pub async fn wait_until_finished(
    api: &dyn ContainerApi,
    container_id: &str,
) -> std::result::Result<(), PlatformError> {
    let started = Instant::now();

    loop {
        match api.status(container_id).await {
            Ok(ContainerStatus::Finished) => {
                debug!("Container {} finished", container_id);
                return Ok(());
            }
            Ok(ContainerStatus::Error(message)) => {
                return Err(PlatformError::Rejection(format!(
                    "container {} processing failed: {}",
                    container_id, message
                )));
            }
            Ok(ContainerStatus::InProgress) => {
                debug!("Container {} still processing", container_id);
            }
            Err(PlatformError::Network(e)) => {
                warn!("Status poll for {} failed transiently: {}", container_id, e);
            }
            Err(e) => return Err(e),
        }

        if started.elapsed() + POLL_INTERVAL > MAX_WAIT {
            return Err(PlatformError::Timeout(format!(
                "container {} not finished after {}s",
                container_id,
                MAX_WAIT.as_secs()
            )));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Run the full container lifecycle for one post.
///
/// Single images publish as one standalone container. Multi-image posts
/// create one child per image, in order; the first child to error aborts
/// the whole post before any parent container exists.
pub async fn publish_containers(
    api: &dyn ContainerApi,
    image_urls: &[String],
    caption: &str,
) -> std::result::Result<String, PlatformError> {
    if image_urls.is_empty() {
        return Err(PlatformError::Rejection(
            "post has no images".to_string(),
        ));
    }

    if image_urls.len() == 1 {
        let container_id = api.create_item(&image_urls[0], Some(caption), false).await?;
        wait_until_finished(api, &container_id).await?;
        return api.publish(&container_id).await;
    }

    let mut children = Vec::with_capacity(image_urls.len());
    for url in image_urls {
        let child_id = api.create_item(url, None, true).await?;
        // Each child must finish before the parent may reference it; the
        // first error aborts the work for this platform.
        wait_until_finished(api, &child_id).await?;
        children.push(child_id);
    }

    let parent_id = api.create_parent(&children, caption).await?;
    wait_until_finished(api, &parent_id).await?;
    api.publish(&parent_id).await
}
