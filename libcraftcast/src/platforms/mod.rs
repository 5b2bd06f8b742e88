//! Platform abstraction and implementations
//!
//! One trait covers the two publish protocol families: carousel-async
//! platforms (Instagram, Threads) that assemble container hierarchies
//! from URL-addressed media, and direct-post platforms (X) that take
//! bytes and one create call. The orchestrator is agnostic to which
//! family it is driving.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::PlatformError;
use crate::storage::ObjectStore;
use crate::types::{ImageData, PlatformId};

pub mod carousel;
pub mod instagram;
pub mod threads;
pub mod x;

// Mock platform is available for all builds so integration tests can
// exercise orchestration without credentials or network access.
pub mod mock;

/// A fully formatted post ready for one platform: caption text plus the
/// image payload in display order.
#[derive(Debug, Clone)]
pub struct PreparedPost {
    pub caption: String,
    pub images: Vec<ImageData>,
}

/// Publish capability of one platform.
///
/// `upload_and_publish` performs all network steps for one post and
/// returns the platform post id. It mutates no local state; recording
/// the outcome is the orchestrator's job.
#[async_trait]
pub trait PublishClient: Send + Sync {
    fn id(&self) -> PlatformId;

    /// Maximum number of images in a single post.
    fn max_images(&self) -> usize;

    async fn upload_and_publish(
        &self,
        post: &PreparedPost,
    ) -> std::result::Result<String, PlatformError>;
}

/// Stage images in the object store and return `(key, url)` pairs in
/// image order. Keys are unique per attempt so concurrent-looking
/// retries never collide.
pub(crate) async fn stage_images(
    store: &Arc<dyn ObjectStore>,
    images: &[ImageData],
) -> std::result::Result<Vec<(String, String)>, PlatformError> {
    let mut staged = Vec::with_capacity(images.len());
    for image in images {
        let key = format!("temp/{}_{}", Uuid::new_v4(), image.filename);
        let url = store
            .put(&key, image.bytes.clone(), image.mime.as_str())
            .await
            .map_err(|e| PlatformError::Network(format!("image staging failed: {}", e)))?;
        staged.push((key, url));
    }
    Ok(staged)
}

/// Best-effort removal of staged objects after a publish attempt.
pub(crate) async fn cleanup_staged(store: &Arc<dyn ObjectStore>, staged: &[(String, String)]) {
    for (key, _) in staged {
        if let Err(e) = store.delete(key).await {
            warn!("Failed to delete staged object {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::types::ImageMime;

    fn image(name: &str) -> ImageData {
        ImageData {
            bytes: vec![0xff, 0xd8],
            filename: name.to_string(),
            mime: ImageMime::Jpeg,
        }
    }

    #[tokio::test]
    async fn test_stage_images_returns_urls_in_order() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let staged = stage_images(&store, &[image("a.jpg"), image("b.jpg")])
            .await
            .unwrap();

        assert_eq!(staged.len(), 2);
        assert!(staged[0].0.ends_with("a.jpg"));
        assert!(staged[1].0.ends_with("b.jpg"));
        assert!(staged[0].1.starts_with("memory://temp/"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_staged_objects() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn ObjectStore> = memory.clone();
        let staged = stage_images(&store, &[image("a.jpg")]).await.unwrap();
        assert!(memory.contains(&staged[0].0));

        cleanup_staged(&store, &staged).await;
        assert!(!memory.contains(&staged[0].0));
    }
}
