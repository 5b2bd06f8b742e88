//! Error types for Craftcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CraftcastError>;

#[derive(Error, Debug)]
pub enum CraftcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Token refresh error: {0}")]
    TokenRefresh(#[from] RefreshError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CraftcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CraftcastError::InvalidInput(_) => 3,
            CraftcastError::Platform(PlatformError::Auth(_)) => 2,
            CraftcastError::Platform(_) => 1,
            CraftcastError::Config(_) => 1,
            CraftcastError::Ledger(_) => 1,
            CraftcastError::Storage(_) => 1,
            CraftcastError::TokenRefresh(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ledger API error: {0}")]
    Api(String),

    #[error("Failed to parse ledger response: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse storage response: {0}")]
    Parse(String),
}

/// Classified publish failure for a single work on a single platform.
///
/// `Network` is transient and retried only inside the bounded container
/// status poll loop. The other variants are permanent for the attempt.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rejected by platform: {0}")]
    Rejection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out waiting for media processing: {0}")]
    Timeout(String),
}

/// Token refresh failure. Fatal for that platform's portion of the run only.
#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Credential store failed: {0}")]
    Store(String),
}
