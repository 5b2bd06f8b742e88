//! Ledger abstraction and implementations
//!
//! The ledger is the external structured record of works and their
//! per-platform posting state. The engine talks to it through the
//! [`WorkRepository`] trait; a Notion-backed implementation covers
//! production and an in-memory implementation covers tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{PlatformId, Work};

pub mod memory;
pub mod notion;

/// A single ledger write for one work on one platform.
///
/// `posted` carries the platform post id; setting it flips the posted
/// flag and records the id in the same write, so the two can never
/// diverge. The error log is append-only: `error_append` adds an entry,
/// `clear_errors` drops this platform's prior entries on success.
#[derive(Debug, Clone, Default)]
pub struct WorkUpdate {
    pub posted: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub error_append: Option<String>,
    pub clear_errors: bool,
}

impl WorkUpdate {
    /// Update recording a successful publish.
    pub fn published(post_id: String, posted_date: NaiveDate) -> Self {
        Self {
            posted: Some(post_id),
            posted_date: Some(posted_date),
            error_append: None,
            clear_errors: true,
        }
    }

    /// Update recording a failed publish attempt.
    pub fn failed(message: String) -> Self {
        Self {
            posted: None,
            posted_date: None,
            error_append: Some(message),
            clear_errors: false,
        }
    }
}

/// Query and update work records.
///
/// Candidate queries return works in ledger order: completion date
/// ascending, ties broken by original input order. Callers apply tier
/// caps and dedup; implementations only filter and sort.
#[async_trait]
pub trait WorkRepository: Send + Sync {
    /// Works scheduled for exactly `date`, excluding skipped works.
    async fn scheduled_for(&self, date: NaiveDate) -> Result<Vec<Work>>;

    /// Works not posted on `platform` but posted on at least one other
    /// platform, excluding skipped works. At most `limit` results.
    async fn catchup_candidates(&self, platform: PlatformId, limit: usize) -> Result<Vec<Work>>;

    /// Works not posted on any platform, excluding skipped works.
    /// At most `limit` results.
    async fn basic_candidates(&self, limit: usize) -> Result<Vec<Work>>;

    /// Apply an update to one work's state for one platform.
    async fn update(&self, work_id: &str, platform: PlatformId, update: WorkUpdate) -> Result<()>;
}
