//! Mock platform implementation for testing
//!
//! A configurable publish client that records what it was asked to
//! publish and can simulate each failure class. Compiled into all builds
//! so integration tests can drive the orchestrator without credentials
//! or network access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PlatformError;
use crate::platforms::{PreparedPost, PublishClient};
use crate::types::PlatformId;

/// A published post as seen by the mock.
#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub caption: String,
    pub image_count: usize,
}

pub struct MockPlatform {
    platform: PlatformId,
    max_images: usize,
    failure: Option<PlatformError>,
    publish_calls: Arc<Mutex<usize>>,
    published: Arc<Mutex<Vec<PublishedPost>>>,
}

impl MockPlatform {
    /// A mock that publishes successfully with the default cap.
    pub fn success(platform: PlatformId) -> Self {
        Self {
            platform,
            max_images: 10,
            failure: None,
            publish_calls: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock whose publishes fail with `error`.
    pub fn failing(platform: PlatformId, error: PlatformError) -> Self {
        Self {
            failure: Some(error),
            ..Self::success(platform)
        }
    }

    /// Override the per-post image cap.
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.max_images = cap;
        self
    }

    pub fn publish_calls(&self) -> usize {
        *self.publish_calls.lock().unwrap()
    }

    pub fn published(&self) -> Vec<PublishedPost> {
        self.published.lock().unwrap().clone()
    }

    /// Handles to the call counters, for asserting after the mock has
    /// been boxed into the orchestrator.
    pub fn counters(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<Vec<PublishedPost>>>) {
        (self.publish_calls.clone(), self.published.clone())
    }
}

#[async_trait]
impl PublishClient for MockPlatform {
    fn id(&self) -> PlatformId {
        self.platform
    }

    fn max_images(&self) -> usize {
        self.max_images
    }

    async fn upload_and_publish(
        &self,
        post: &PreparedPost,
    ) -> std::result::Result<String, PlatformError> {
        *self.publish_calls.lock().unwrap() += 1;

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        self.published.lock().unwrap().push(PublishedPost {
            caption: post.caption.clone(),
            image_count: post.images.len(),
        });

        Ok(format!("{}:mock-{}", self.platform, Uuid::new_v4()))
    }
}
