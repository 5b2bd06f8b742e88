//! In-memory ledger implementation
//!
//! Available in all builds (not just tests) so integration tests can
//! exercise selection and orchestration without a live ledger.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::error::{LedgerError, Result};
use crate::ledger::{WorkRepository, WorkUpdate};
use crate::types::{ErrorEntry, PlatformId, PlatformState, Work};

#[derive(Default)]
pub struct MemoryLedger {
    works: Mutex<Vec<Work>>,
    update_calls: AtomicUsize,
    fail_updates: AtomicBool,
}

impl MemoryLedger {
    pub fn new(works: Vec<Work>) -> Self {
        Self {
            works: Mutex::new(works),
            update_calls: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// Snapshot of all works in insertion order.
    pub fn works(&self) -> Vec<Work> {
        self.works.lock().unwrap().clone()
    }

    pub fn work(&self, id: &str) -> Option<Work> {
        self.works.lock().unwrap().iter().find(|w| w.id == id).cloned()
    }

    /// Number of update calls received, successful or not.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent update calls fail, to exercise the
    /// publish-succeeded-but-ledger-write-failed path.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Stable sort by completion date ascending, works without a
    /// completion date last. Ties keep input order.
    fn by_completion(mut works: Vec<Work>) -> Vec<Work> {
        works.sort_by_key(|w| w.completion_date.unwrap_or(NaiveDate::MAX));
        works
    }
}

#[async_trait]
impl WorkRepository for MemoryLedger {
    async fn scheduled_for(&self, date: NaiveDate) -> Result<Vec<Work>> {
        let works = self.works.lock().unwrap();
        Ok(works
            .iter()
            .filter(|w| !w.skip && w.scheduled_date == Some(date))
            .cloned()
            .collect())
    }

    async fn catchup_candidates(&self, platform: PlatformId, limit: usize) -> Result<Vec<Work>> {
        let works = self.works.lock().unwrap();
        let matching: Vec<Work> = works
            .iter()
            .filter(|w| !w.skip && !w.is_posted(platform) && w.posted_elsewhere(platform))
            .cloned()
            .collect();
        Ok(Self::by_completion(matching).into_iter().take(limit).collect())
    }

    async fn basic_candidates(&self, limit: usize) -> Result<Vec<Work>> {
        let works = self.works.lock().unwrap();
        let matching: Vec<Work> = works
            .iter()
            .filter(|w| !w.skip && !w.posted_anywhere())
            .cloned()
            .collect();
        Ok(Self::by_completion(matching).into_iter().take(limit).collect())
    }

    async fn update(&self, work_id: &str, platform: PlatformId, update: WorkUpdate) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(LedgerError::Api("simulated update failure".to_string()).into());
        }

        let mut works = self.works.lock().unwrap();
        let work = works
            .iter_mut()
            .find(|w| w.id == work_id)
            .ok_or_else(|| LedgerError::Api(format!("work not found: {}", work_id)))?;

        if let Some(post_id) = update.posted {
            work.platforms.insert(
                platform,
                PlatformState {
                    posted: true,
                    post_id: Some(post_id),
                },
            );
        }

        if update.clear_errors {
            work.error_log.retain(|e| e.platform != platform);
        }

        if let Some(message) = update.error_append {
            work.error_log.push(ErrorEntry {
                timestamp: Utc::now(),
                platform,
                message,
            });
        }

        Ok(())
    }
}
