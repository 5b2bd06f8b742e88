//! Craftcast - publishing orchestration for finished artwork photographs
//!
//! Selects which works to publish per platform and date, drives the
//! per-platform publish protocols (carousel container lifecycles and
//! direct posts), refreshes expiring credentials ahead of time, and
//! records every outcome in the external ledger.

pub mod caption;
pub mod config;
pub mod error;
pub mod images;
pub mod ledger;
pub mod logging;
pub mod plan;
pub mod platforms;
pub mod poster;
pub mod selection;
pub mod setup;
pub mod storage;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{CraftcastError, PlatformError, RefreshError, Result};
pub use poster::{PostingOrchestrator, RunOptions, RunReport};
pub use types::{PlatformId, Work};
