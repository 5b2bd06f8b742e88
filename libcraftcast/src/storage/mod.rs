//! Object store abstraction and implementations
//!
//! Carousel platforms only accept externally reachable URLs for container
//! creation, so image bytes are staged in an object store for the duration
//! of a publish attempt. The store also persists refreshed credentials as
//! JSON documents.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub mod r2;
pub mod sigv4;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload bytes under `key` and return an externally reachable URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Delete the object under `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Fetch a JSON document, `None` if the key does not exist.
    async fn get_json(&self, key: &str) -> Result<Option<Value>>;

    /// Store a JSON document under `key`, replacing any previous value.
    async fn put_json(&self, key: &str, value: &Value) -> Result<()>;
}

/// In-memory object store for tests; available in all builds.
pub mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::StorageError;

    #[derive(Default)]
    pub struct MemoryStore {
        objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
        put_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_calls(&self) -> usize {
            self.put_calls.load(Ordering::SeqCst)
        }

        pub fn delete_calls(&self) -> usize {
            self.delete_calls.load(Ordering::SeqCst)
        }

        pub fn contains(&self, key: &str) -> bool {
            self.objects.lock().unwrap().contains_key(key)
        }

        pub fn object(&self, key: &str) -> Option<Vec<u8>> {
            self.objects.lock().unwrap().get(key).map(|(b, _)| b.clone())
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (bytes, content_type.to_string()));
            Ok(format!("memory://{}", key))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn get_json(&self, key: &str) -> Result<Option<Value>> {
            let objects = self.objects.lock().unwrap();
            match objects.get(key) {
                Some((bytes, _)) => {
                    let value = serde_json::from_slice(bytes)
                        .map_err(|e| StorageError::Parse(e.to_string()))?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }

        async fn put_json(&self, key: &str, value: &Value) -> Result<()> {
            let bytes = serde_json::to_vec(value)
                .map_err(|e| StorageError::Parse(e.to_string()))?;
            self.put(key, bytes, "application/json").await?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn test_put_and_delete() {
            let store = MemoryStore::new();
            let url = store
                .put("temp/a.jpg", vec![1, 2, 3], "image/jpeg")
                .await
                .unwrap();
            assert_eq!(url, "memory://temp/a.jpg");
            assert!(store.contains("temp/a.jpg"));

            store.delete("temp/a.jpg").await.unwrap();
            assert!(!store.contains("temp/a.jpg"));
            assert_eq!(store.put_calls(), 1);
            assert_eq!(store.delete_calls(), 1);
        }

        #[tokio::test]
        async fn test_json_round_trip() {
            let store = MemoryStore::new();
            let doc = json!({ "access_token": "abc", "expires_at": "2026-05-01T00:00:00Z" });

            store.put_json("config/token.json", &doc).await.unwrap();
            let loaded = store.get_json("config/token.json").await.unwrap();
            assert_eq!(loaded, Some(doc));
        }

        #[tokio::test]
        async fn test_get_json_missing_is_none() {
            let store = MemoryStore::new();
            assert_eq!(store.get_json("missing").await.unwrap(), None);
        }
    }
}
