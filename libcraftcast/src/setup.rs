//! Wiring: build an orchestrator from configuration
//!
//! Reads token files, prefers stored (refreshed) credentials over the
//! configured bootstrap tokens, and creates a client per enabled
//! platform.

use std::sync::Arc;

use tracing::info;

use crate::config::{read_secret_file, Config};
use crate::error::Result;
use crate::images::HttpImageSource;
use crate::ledger::notion::NotionLedger;
use crate::platforms::instagram::InstagramClient;
use crate::platforms::threads::ThreadsClient;
use crate::platforms::x::XClient;
use crate::poster::{PlatformHandle, PostingOrchestrator};
use crate::storage::r2::R2Storage;
use crate::storage::ObjectStore;
use crate::token::{adopt_stored_token, ObjectTokenStore, SharedToken, TokenManager};
use crate::types::PlatformId;

/// Parse a comma-separated platform list, falling back to the configured
/// defaults when absent.
pub fn resolve_platforms(arg: Option<&str>, config: &Config) -> Result<Vec<PlatformId>> {
    let names: Vec<String> = match arg {
        Some(raw) => raw.split(',').map(|s| s.trim().to_string()).collect(),
        None => config.defaults.platforms.clone(),
    };

    let mut platforms = Vec::new();
    for name in names {
        let platform = name
            .parse::<PlatformId>()
            .map_err(crate::error::CraftcastError::InvalidInput)?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }

    if platforms.is_empty() {
        return Err(crate::error::CraftcastError::InvalidInput(
            "no platforms selected".to_string(),
        ));
    }
    Ok(platforms)
}

/// Build the orchestrator: ledger, object store, token manager, and one
/// client per enabled platform.
pub async fn build_orchestrator(config: &Config) -> Result<PostingOrchestrator> {
    let ledger_token = read_secret_file(&config.ledger.token_file)?;
    let repo = Arc::new(NotionLedger::new(
        ledger_token,
        config.ledger.database_id.clone(),
    ));

    let storage_secret = read_secret_file(&config.storage.secret_key_file)?;
    let store: Arc<dyn ObjectStore> = Arc::new(R2Storage::new(&config.storage, storage_secret));

    let tokens = TokenManager::new(Arc::new(ObjectTokenStore::new(store.clone())));

    let mut handles = Vec::new();

    if let Some(instagram) = &config.instagram {
        if instagram.enabled {
            info!("Creating Instagram client");
            let token = SharedToken::new(read_secret_file(&instagram.token_file)?);
            adopt_stored_token(&tokens, PlatformId::Instagram, &token).await?;

            let app_secret = read_secret_file(&instagram.app_secret_file)?;
            let client = Arc::new(InstagramClient::new(
                instagram,
                app_secret,
                token,
                store.clone(),
            ));
            handles.push(PlatformHandle::new(client.clone()).with_refresher(client));
        }
    }

    if let Some(threads) = &config.threads {
        if threads.enabled {
            info!("Creating Threads client");
            let token = SharedToken::new(read_secret_file(&threads.token_file)?);
            adopt_stored_token(&tokens, PlatformId::Threads, &token).await?;

            let client = Arc::new(ThreadsClient::new(threads, token, store.clone()));
            handles.push(PlatformHandle::new(client.clone()).with_refresher(client));
        }
    }

    if let Some(x) = &config.x {
        if x.enabled {
            info!("Creating X client");
            // X tokens do not expire in this deployment; no refresher.
            let token = SharedToken::new(read_secret_file(&x.token_file)?);
            let client = Arc::new(XClient::new(token));
            handles.push(PlatformHandle::new(client));
        }
    }

    if handles.is_empty() {
        tracing::warn!("No platforms are enabled in configuration");
    } else {
        info!("Created {} platform client(s)", handles.len());
    }

    Ok(PostingOrchestrator::new(
        repo,
        handles,
        tokens,
        Arc::new(HttpImageSource::new()),
        config.defaults.tags.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsConfig;

    fn config_with_defaults(platforms: Vec<&str>) -> Config {
        let toml = r#"
[ledger]
token_file = "/tmp/none"
database_id = "db"

[storage]
account_id = "acct"
access_key_id = "key"
secret_key_file = "/tmp/none"
bucket = "b"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.defaults = DefaultsConfig {
            platforms: platforms.into_iter().map(str::to_string).collect(),
            ..Default::default()
        };
        config
    }

    #[test]
    fn test_resolve_platforms_from_arg() {
        let config = config_with_defaults(vec!["instagram"]);
        let platforms = resolve_platforms(Some("x, threads"), &config).unwrap();
        assert_eq!(platforms, vec![PlatformId::X, PlatformId::Threads]);
    }

    #[test]
    fn test_resolve_platforms_falls_back_to_defaults() {
        let config = config_with_defaults(vec!["threads", "x"]);
        let platforms = resolve_platforms(None, &config).unwrap();
        assert_eq!(platforms, vec![PlatformId::Threads, PlatformId::X]);
    }

    #[test]
    fn test_resolve_platforms_dedups() {
        let config = config_with_defaults(vec![]);
        let platforms = resolve_platforms(Some("x,x,twitter"), &config).unwrap();
        assert_eq!(platforms, vec![PlatformId::X]);
    }

    #[test]
    fn test_resolve_platforms_rejects_unknown() {
        let config = config_with_defaults(vec![]);
        let result = resolve_platforms(Some("mastodon"), &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_platforms_rejects_empty() {
        let config = config_with_defaults(vec![]);
        assert!(resolve_platforms(None, &config).is_err());
    }
}
