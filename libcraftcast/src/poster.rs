//! Posting orchestration
//!
//! Drives one run: per platform, check credentials, select candidates,
//! publish each in order, and record outcomes in the ledger. Strictly
//! sequential: one work's result is fully resolved before the next
//! candidate, one platform before the next. A failing work never aborts
//! its platform; a failing platform never aborts the others.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::caption;
use crate::error::Result;
use crate::images::ImageSource;
use crate::ledger::{WorkRepository, WorkUpdate};
use crate::plan::{self, SubPost};
use crate::platforms::{PreparedPost, PublishClient};
use crate::selection;
use crate::token::{TokenManager, TokenRefresher};
use crate::types::{ImageData, PlatformId, Work};

/// One platform as wired into the orchestrator: its publish client and,
/// for platforms with expiring credentials, its refresh capability.
pub struct PlatformHandle {
    pub client: Arc<dyn PublishClient>,
    pub refresher: Option<Arc<dyn TokenRefresher>>,
}

impl PlatformHandle {
    pub fn new(client: Arc<dyn PublishClient>) -> Self {
        Self {
            client,
            refresher: None,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub date: NaiveDate,
    pub platforms: Vec<PlatformId>,
    pub basic_limit: usize,
    pub catchup_limit: usize,
    pub dry_run: bool,
}

/// Outcome of a run. Per-work failures are recorded here and do not fail
/// the run itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    /// Titles of works processed, in processing order.
    pub processed: Vec<String>,
    /// Titles published (or would-publish, in dry-run) per platform.
    pub published: BTreeMap<PlatformId, Vec<String>>,
    /// Platforms skipped for the run, with the reason.
    pub skipped_platforms: Vec<String>,
    /// Recorded per-work failures.
    pub errors: Vec<String>,
}

impl RunReport {
    fn record_published(&mut self, platform: PlatformId, title: &str) {
        self.published
            .entry(platform)
            .or_default()
            .push(title.to_string());
    }
}

/// Image bytes fetched per work for the duration of one run.
type ImageCache = HashMap<String, Arc<Vec<ImageData>>>;

pub struct PostingOrchestrator {
    repo: Arc<dyn WorkRepository>,
    handles: Vec<PlatformHandle>,
    tokens: TokenManager,
    images: Arc<dyn ImageSource>,
    default_tags: String,
}

impl PostingOrchestrator {
    pub fn new(
        repo: Arc<dyn WorkRepository>,
        handles: Vec<PlatformHandle>,
        tokens: TokenManager,
        images: Arc<dyn ImageSource>,
        default_tags: String,
    ) -> Self {
        Self {
            repo,
            handles,
            tokens,
            images,
            default_tags,
        }
    }

    /// The daily run: scheduled, catch-up, and basic tiers per platform.
    pub async fn run_daily(&self, opts: &RunOptions) -> Result<RunReport> {
        info!(
            "Starting daily run for {} (dry run: {})",
            opts.date, opts.dry_run
        );

        let mut report = RunReport {
            dry_run: opts.dry_run,
            ..Default::default()
        };
        let mut cache: ImageCache = HashMap::new();
        let mut processed_ids: HashSet<String> = HashSet::new();

        for handle in self.requested(&opts.platforms) {
            let platform = handle.client.id();

            if !self.platform_ready(handle, opts.dry_run, &mut report).await {
                continue;
            }

            let candidates = match selection::select_candidates(
                self.repo.as_ref(),
                opts.date,
                platform,
                opts.basic_limit,
                opts.catchup_limit,
            )
            .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    error!("[{}] Selection failed: {}", platform, e);
                    report
                        .skipped_platforms
                        .push(format!("{}: selection failed: {}", platform, e));
                    continue;
                }
            };

            self.process_candidates(
                handle,
                opts.date,
                candidates,
                opts.dry_run,
                &mut cache,
                &mut processed_ids,
                &mut report,
            )
            .await;
        }

        Ok(report)
    }

    /// Catch-up-only run with an explicit per-platform limit.
    pub async fn run_catchup(
        &self,
        date: NaiveDate,
        platforms: &[PlatformId],
        limit: usize,
        dry_run: bool,
    ) -> Result<RunReport> {
        info!(
            "Starting catch-up run (limit: {}, dry run: {})",
            limit, dry_run
        );

        let mut report = RunReport {
            dry_run,
            ..Default::default()
        };
        let mut cache: ImageCache = HashMap::new();
        let mut processed_ids: HashSet<String> = HashSet::new();

        for handle in self.requested(platforms) {
            let platform = handle.client.id();

            if !self.platform_ready(handle, dry_run, &mut report).await {
                continue;
            }

            let candidates =
                match selection::select_catchup(self.repo.as_ref(), platform, limit).await {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        error!("[{}] Selection failed: {}", platform, e);
                        report
                            .skipped_platforms
                            .push(format!("{}: selection failed: {}", platform, e));
                        continue;
                    }
                };

            self.process_candidates(
                handle,
                date,
                candidates,
                dry_run,
                &mut cache,
                &mut processed_ids,
                &mut report,
            )
            .await;
        }

        Ok(report)
    }

    /// Handles for the requested platforms, in registration order.
    fn requested(&self, platforms: &[PlatformId]) -> Vec<&PlatformHandle> {
        self.handles
            .iter()
            .filter(|h| platforms.contains(&h.client.id()))
            .collect()
    }

    /// Refresh the platform credential when needed. A refresh failure
    /// skips the platform for this run and leaves the others untouched.
    async fn platform_ready(
        &self,
        handle: &PlatformHandle,
        dry_run: bool,
        report: &mut RunReport,
    ) -> bool {
        let platform = handle.client.id();

        if dry_run {
            return true;
        }

        if let Some(refresher) = &handle.refresher {
            if let Err(e) = self
                .tokens
                .check_and_refresh(refresher.as_ref(), Utc::now())
                .await
            {
                error!("[{}] Token refresh failed: {}", platform, e);
                report
                    .skipped_platforms
                    .push(format!("{}: token refresh failed: {}", platform, e));
                return false;
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_candidates(
        &self,
        handle: &PlatformHandle,
        date: NaiveDate,
        candidates: Vec<Work>,
        dry_run: bool,
        cache: &mut ImageCache,
        processed_ids: &mut HashSet<String>,
        report: &mut RunReport,
    ) {
        let platform = handle.client.id();

        for work in candidates {
            if work.is_posted(platform) {
                continue;
            }

            if processed_ids.insert(work.id.clone()) {
                report.processed.push(work.title.clone());
            }

            if work.image_urls.is_empty() {
                let message = "no images attached".to_string();
                warn!("[{}] {}: {}", platform, work.title, message);
                if !dry_run {
                    self.record_failure(&work, platform, &message, report).await;
                } else {
                    report.errors.push(format!("{} ({})", work.title, message));
                }
                continue;
            }

            let caption = caption::compose_caption(
                &work.title,
                work.caption.as_deref(),
                work.completion_date,
                work.tags.as_deref(),
                &self.default_tags,
            );

            let anchor = work.scheduled_date.unwrap_or(date);
            let plan = plan::subpost_plan(&work, handle.client.max_images(), anchor);
            let parts = parts_due(&plan, date, work.scheduled_date.is_some());
            if parts.is_empty() {
                continue;
            }

            if dry_run {
                info!(
                    "[{}] Dry run: would publish '{}' ({} part(s), {} image(s))",
                    platform,
                    work.title,
                    parts.len(),
                    work.image_urls.len()
                );
                info!("  Caption:\n{}", caption);
                report.record_published(platform, &work.title);
                continue;
            }

            let images = match self.work_images(&work, cache).await {
                Ok(images) => images,
                Err(message) => {
                    error!("[{}] {}: {}", platform, work.title, message);
                    self.record_failure(&work, platform, &message, report).await;
                    continue;
                }
            };

            self.publish_parts(handle, date, &work, &caption, &parts, &images, report)
                .await;
        }
    }

    /// Fetch a work's images once per run, reusing them across platforms.
    async fn work_images(
        &self,
        work: &Work,
        cache: &mut ImageCache,
    ) -> std::result::Result<Arc<Vec<ImageData>>, String> {
        if let Some(images) = cache.get(&work.id) {
            return Ok(images.clone());
        }

        let mut images = Vec::with_capacity(work.image_urls.len());
        for url in &work.image_urls {
            match self.images.fetch(url).await {
                Ok(image) => images.push(image),
                Err(e) => return Err(format!("image fetch failed: {}", e)),
            }
        }

        let images = Arc::new(images);
        cache.insert(work.id.clone(), images.clone());
        Ok(images)
    }

    #[allow(clippy::too_many_arguments)]
    async fn publish_parts(
        &self,
        handle: &PlatformHandle,
        date: NaiveDate,
        work: &Work,
        caption: &str,
        parts: &[&SubPost],
        images: &[ImageData],
        report: &mut RunReport,
    ) {
        let platform = handle.client.id();

        for part in parts {
            let prepared = PreparedPost {
                caption: format!("{}{}", caption, part.caption_suffix()),
                images: images[part.offset..part.offset + part.image_urls.len()].to_vec(),
            };

            match handle.client.upload_and_publish(&prepared).await {
                Ok(post_id) => {
                    if part.seq < part.total {
                        info!(
                            "[{}] Published '{}' part {}/{}: {}",
                            platform, work.title, part.seq, part.total, post_id
                        );
                        continue;
                    }

                    // Final part: flip posted and post id in one write,
                    // dropping this platform's stale errors.
                    match self
                        .repo
                        .update(&work.id, platform, WorkUpdate::published(post_id.clone(), date))
                        .await
                    {
                        Ok(()) => {
                            info!("[{}] Published '{}': {}", platform, work.title, post_id);
                            report.record_published(platform, &work.title);
                        }
                        Err(e) => {
                            // The platform call succeeded but the ledger
                            // write did not: treat as not posted so the
                            // work is re-attempted rather than lost.
                            warn!(
                                "[{}] Published '{}' as {} but ledger update failed: {}",
                                platform, work.title, post_id, e
                            );
                            report.errors.push(format!(
                                "{} ({}: ledger update failed after publish: {})",
                                work.title, platform, e
                            ));
                        }
                    }
                }
                Err(e) => {
                    error!("[{}] Failed to publish '{}': {}", platform, work.title, e);
                    self.record_failure(work, platform, &e.to_string(), report)
                        .await;
                    break;
                }
            }
        }
    }

    /// Append the failure to the work's error log and the run report.
    /// A failing ledger write here is logged but cannot fail the run.
    async fn record_failure(
        &self,
        work: &Work,
        platform: PlatformId,
        message: &str,
        report: &mut RunReport,
    ) {
        report
            .errors
            .push(format!("{} ({}: {})", work.title, platform, message));

        if let Err(e) = self
            .repo
            .update(&work.id, platform, WorkUpdate::failed(message.to_string()))
            .await
        {
            warn!(
                "[{}] Failed to record error for '{}': {}",
                platform, work.title, e
            );
        }
    }
}

/// Which parts of a plan to publish on `run_date`.
///
/// Single-part plans publish whenever the work is selected. Multi-part
/// plans anchored at a scheduled date publish the parts dated exactly
/// `run_date`, so consecutive daily runs walk the plan one part per day.
/// Without a scheduled anchor (or when re-selected after the plan's
/// window) there is no durable way to resume mid-plan, so all parts
/// publish sequentially in this run.
fn parts_due<'a>(plan: &'a [SubPost], run_date: NaiveDate, anchored: bool) -> Vec<&'a SubPost> {
    if plan.len() <= 1 {
        return plan.iter().collect();
    }

    if anchored {
        let due: Vec<&SubPost> = plan.iter().filter(|p| p.date == run_date).collect();
        if !due.is_empty() {
            return due;
        }
    }

    plan.iter().collect()
}
