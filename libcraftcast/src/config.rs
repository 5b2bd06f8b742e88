//! Configuration management for Craftcast

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub instagram: Option<InstagramConfig>,
    pub threads: Option<ThreadsConfig>,
    pub x: Option<XConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path to a file holding the ledger API token.
    pub token_file: String,
    pub database_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub account_id: String,
    pub access_key_id: String,
    /// Path to a file holding the secret access key.
    pub secret_key_file: String,
    pub bucket: String,
    /// Base URL for public bucket access. When unset, presigned GET URLs
    /// are generated instead.
    pub public_url: Option<String>,
}

impl StorageConfig {
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub enabled: bool,
    pub app_id: String,
    pub app_secret_file: String,
    pub token_file: String,
    pub business_account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsConfig {
    pub enabled: bool,
    pub app_id: String,
    pub app_secret_file: String,
    pub token_file: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    pub enabled: bool,
    pub token_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,
    /// Tags appended to every caption, space separated.
    #[serde(default)]
    pub tags: String,
    #[serde(default = "default_basic_limit")]
    pub basic_limit: usize,
    #[serde(default = "default_catchup_limit")]
    pub catchup_limit: usize,
}

fn default_platforms() -> Vec<String> {
    vec![
        "instagram".to_string(),
        "threads".to_string(),
        "x".to_string(),
    ]
}

fn default_basic_limit() -> usize {
    2
}

fn default_catchup_limit() -> usize {
    1
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platforms: default_platforms(),
            tags: String::new(),
            basic_limit: default_basic_limit(),
            catchup_limit: default_catchup_limit(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CRAFTCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("craftcast").join("config.toml"))
}

/// Read a secret (token, key) from a file, trimming surrounding whitespace.
pub fn read_secret_file(path: &str) -> Result<String> {
    let expanded = shellexpand::tilde(path).to_string();
    let content = std::fs::read_to_string(&expanded).map_err(ConfigError::ReadError)?;
    let secret = content.trim().to_string();
    if secret.is_empty() {
        return Err(ConfigError::MissingField(format!("secret file is empty: {}", path)).into());
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[ledger]
token_file = "~/.config/craftcast/ledger.token"
database_id = "abc123"

[storage]
account_id = "acct"
access_key_id = "key"
secret_key_file = "~/.config/craftcast/r2.secret"
bucket = "craftcast-media"

[instagram]
enabled = true
app_id = "1234"
app_secret_file = "~/.config/craftcast/instagram.secret"
token_file = "~/.config/craftcast/instagram.token"
business_account_id = "17840000000000000"

[x]
enabled = false
token_file = "~/.config/craftcast/x.token"

[defaults]
tags = "studentwork woodcarving"
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.ledger.database_id, "abc123");
        assert_eq!(
            config.storage.endpoint_url(),
            "https://acct.r2.cloudflarestorage.com"
        );
        assert!(config.instagram.as_ref().unwrap().enabled);
        assert!(config.threads.is_none());
        assert!(!config.x.as_ref().unwrap().enabled);
    }

    #[test]
    fn test_defaults_applied() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.defaults.basic_limit, 2);
        assert_eq!(config.defaults.catchup_limit, 1);
        assert_eq!(config.defaults.platforms.len(), 3);
        assert_eq!(config.defaults.tags, "studentwork woodcarving");
    }

    #[test]
    fn test_load_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.storage.bucket, "craftcast-media");
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let result = Config::load_from_path(&PathBuf::from("/nonexistent/config.toml"));
        assert!(matches!(
            result,
            Err(crate::error::CraftcastError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    fn test_read_secret_file_trims() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  secret-token\n").unwrap();

        let secret = read_secret_file(path.to_str().unwrap()).unwrap();
        assert_eq!(secret, "secret-token");
    }

    #[test]
    fn test_read_secret_file_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();

        assert!(read_secret_file(path.to_str().unwrap()).is_err());
    }
}
