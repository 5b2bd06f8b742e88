//! Cloudflare R2 object store implementation
//!
//! Uses the S3-compatible endpoint with SigV4 header signing. Public
//! buckets return `{public_url}/{key}` URLs; otherwise a presigned GET
//! URL is generated so carousel platforms can fetch the object.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::storage::sigv4::{self, Credentials};
use crate::storage::ObjectStore;

const PRESIGN_EXPIRES_SECS: u64 = 3600;

pub struct R2Storage {
    http: reqwest::Client,
    host: String,
    bucket: String,
    credentials: Credentials,
    public_url: Option<String>,
}

impl R2Storage {
    pub fn new(config: &StorageConfig, secret_access_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: format!("{}.r2.cloudflarestorage.com", config.account_id),
            bucket: config.bucket.clone(),
            credentials: Credentials {
                access_key_id: config.access_key_id.clone(),
                secret_access_key,
            },
            public_url: config.public_url.clone(),
        }
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, key)
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}{}", self.host, self.object_path(key))
    }

    /// URL the outside world can fetch the object from.
    fn public_object_url(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => sigv4::presign_get(
                &self.credentials,
                &self.host,
                &self.object_path(key),
                PRESIGN_EXPIRES_SECS,
                Utc::now(),
            ),
        }
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response> {
        let path = self.object_path(key);
        let signed = sigv4::sign_request(
            &self.credentials,
            method.as_str(),
            &self.host,
            &path,
            &[],
            &body,
            Utc::now(),
        );

        let mut request = self
            .http
            .request(method, self.object_url(key))
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256);

        if let Some(ct) = content_type {
            request = request.header("Content-Type", ct);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        request.send().await.map_err(|e| StorageError::Http(e).into())
    }
}

#[async_trait]
impl ObjectStore for R2Storage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let response = self
            .signed_request(reqwest::Method::PUT, key, bytes, Some(content_type))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        info!("Uploaded object: {}", key);
        Ok(self.public_object_url(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .signed_request(reqwest::Method::DELETE, key, Vec::new(), None)
            .await?;

        let status = response.status();
        // Deleting a missing key is not an error for cleanup purposes.
        if !status.is_success() && status.as_u16() != 404 {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        info!("Deleted object: {}", key);
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<Value>> {
        let response = self
            .signed_request(reqwest::Method::GET, key, Vec::new(), None)
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!("Object not found: {}", key);
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(StorageError::Http)?;
        let value =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Parse(e.to_string()))?;
        Ok(Some(value))
    }

    async fn put_json(&self, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Parse(e.to_string()))?;
        self.put(key, bytes, "application/json").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig {
            account_id: "acct".to_string(),
            access_key_id: "key".to_string(),
            secret_key_file: "/dev/null".to_string(),
            bucket: "media".to_string(),
            public_url: None,
        }
    }

    #[test]
    fn test_object_path_and_url() {
        let storage = R2Storage::new(&config(), "secret".to_string());
        assert_eq!(storage.object_path("temp/a.jpg"), "/media/temp/a.jpg");
        assert_eq!(
            storage.object_url("temp/a.jpg"),
            "https://acct.r2.cloudflarestorage.com/media/temp/a.jpg"
        );
    }

    #[test]
    fn test_public_url_base_used_when_configured() {
        let mut cfg = config();
        cfg.public_url = Some("https://media.example.com/".to_string());
        let storage = R2Storage::new(&cfg, "secret".to_string());

        assert_eq!(
            storage.public_object_url("temp/a.jpg"),
            "https://media.example.com/temp/a.jpg"
        );
    }

    #[test]
    fn test_presigned_url_when_no_public_base() {
        let storage = R2Storage::new(&config(), "secret".to_string());
        let url = storage.public_object_url("temp/a.jpg");

        assert!(url.starts_with("https://acct.r2.cloudflarestorage.com/media/temp/a.jpg?"));
        assert!(url.contains("X-Amz-Signature="));
    }
}
