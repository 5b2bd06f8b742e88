//! Candidate selection
//!
//! Decides which works to publish for a platform on a date. Three tiers,
//! unioned in order with dedup by work id:
//!
//! 1. Scheduled: works scheduled for exactly the target date, uncapped.
//! 2. Catch-up: works posted elsewhere but not here, oldest first.
//! 3. Basic: works posted nowhere, oldest first.
//!
//! Skipped works never appear in any tier. Tier queries over-fetch by a
//! fixed headroom so dedup against earlier tiers cannot starve a tier.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::info;

use crate::error::Result;
use crate::ledger::WorkRepository;
use crate::types::{PlatformId, Work};

const FETCH_HEADROOM: usize = 8;

/// Compute the ordered candidate list for one platform and date.
pub async fn select_candidates(
    repo: &dyn WorkRepository,
    date: NaiveDate,
    platform: PlatformId,
    basic_limit: usize,
    catchup_limit: usize,
) -> Result<Vec<Work>> {
    let mut selected: Vec<Work> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    // Tier 1: scheduled works, regardless of limits. A work already
    // posted here is not re-emitted (posted is monotonic).
    let scheduled = repo.scheduled_for(date).await?;
    for work in scheduled {
        if work.skip || work.is_posted(platform) || !seen.insert(work.id.clone()) {
            continue;
        }
        selected.push(work);
    }
    if !selected.is_empty() {
        info!(
            "[{}] {} scheduled work(s) for {}",
            platform,
            selected.len(),
            date
        );
    }

    // Tier 2: catch-up.
    let added = fill_catchup(repo, platform, catchup_limit, &mut seen, &mut selected).await?;
    if added > 0 {
        info!("[{}] Added {} catch-up work(s)", platform, added);
    }

    // Tier 3: basic.
    let mut added = 0;
    if basic_limit > 0 {
        let candidates = repo
            .basic_candidates(basic_limit + FETCH_HEADROOM)
            .await?;
        for work in candidates {
            if added >= basic_limit {
                break;
            }
            if work.skip || work.posted_anywhere() || !seen.insert(work.id.clone()) {
                continue;
            }
            selected.push(work);
            added += 1;
        }
    }
    if added > 0 {
        info!("[{}] Added {} basic work(s)", platform, added);
    }

    Ok(selected)
}

/// Standalone catch-up selection with an explicit limit, for ad hoc
/// "publish what's missing on one platform" runs.
pub async fn select_catchup(
    repo: &dyn WorkRepository,
    platform: PlatformId,
    limit: usize,
) -> Result<Vec<Work>> {
    let mut selected = Vec::new();
    let mut seen = HashSet::new();
    let added = fill_catchup(repo, platform, limit, &mut seen, &mut selected).await?;
    if added > 0 {
        info!("[{}] Added {} catch-up work(s)", platform, added);
    }
    Ok(selected)
}

async fn fill_catchup(
    repo: &dyn WorkRepository,
    platform: PlatformId,
    limit: usize,
    seen: &mut HashSet<String>,
    selected: &mut Vec<Work>,
) -> Result<usize> {
    if limit == 0 {
        return Ok(0);
    }

    let candidates = repo
        .catchup_candidates(platform, limit + FETCH_HEADROOM)
        .await?;

    let mut added = 0;
    for work in candidates {
        if added >= limit {
            break;
        }
        if work.skip
            || work.is_posted(platform)
            || !work.posted_elsewhere(platform)
            || !seen.insert(work.id.clone())
        {
            continue;
        }
        selected.push(work);
        added += 1;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use crate::types::PlatformState;
    use std::collections::BTreeMap;

    fn work(id: &str, completion: &str) -> Work {
        Work {
            id: id.to_string(),
            title: format!("Work {}", id),
            student: None,
            image_urls: vec![format!("https://example.com/{}.jpg", id)],
            completion_date: Some(completion.parse().unwrap()),
            scheduled_date: None,
            skip: false,
            caption: None,
            tags: None,
            platforms: BTreeMap::new(),
            error_log: Vec::new(),
        }
    }

    fn posted_on(mut w: Work, platform: PlatformId) -> Work {
        w.platforms.insert(
            platform,
            PlatformState {
                posted: true,
                post_id: Some("existing".to_string()),
            },
        );
        w
    }

    fn scheduled(mut w: Work, date: &str) -> Work {
        w.scheduled_date = Some(date.parse().unwrap());
        w
    }

    fn skipped(mut w: Work) -> Work {
        w.skip = true;
        w
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_scheduled_selected_with_zero_limits() {
        let ledger = MemoryLedger::new(vec![
            scheduled(work("s1", "2026-01-01"), "2026-03-01"),
            scheduled(work("s2", "2026-01-02"), "2026-03-01"),
            work("basic", "2026-01-03"),
        ]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 0, 0)
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_skip_excluded_from_every_tier() {
        let ledger = MemoryLedger::new(vec![
            skipped(scheduled(work("s1", "2026-01-01"), "2026-03-01")),
            skipped(posted_on(work("c1", "2026-01-02"), PlatformId::Instagram)),
            skipped(work("b1", "2026-01-03")),
        ]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 5, 5)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_catchup_never_returns_already_posted() {
        let ledger = MemoryLedger::new(vec![posted_on(
            posted_on(work("both", "2026-01-01"), PlatformId::Instagram),
            PlatformId::X,
        )]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 0, 5)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_spec_scenario_catchup_then_basic() {
        // Five unposted works d1 < d2 < d3 < d4 < d5, none scheduled
        // today; d3 already on Instagram but not X. For X with
        // basic_limit=2, catchup_limit=1: {d3, d1, d2} in that order.
        let ledger = MemoryLedger::new(vec![
            work("d1", "2026-01-01"),
            work("d2", "2026-01-02"),
            posted_on(work("d3", "2026-01-03"), PlatformId::Instagram),
            work("d4", "2026-01-04"),
            work("d5", "2026-01-05"),
        ]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 2, 1)
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["d3", "d1", "d2"]);
    }

    #[tokio::test]
    async fn test_basic_ordering_ascending_with_stable_ties() {
        let ledger = MemoryLedger::new(vec![
            work("b", "2026-01-02"),
            work("a2", "2026-01-01"),
            work("a1", "2026-01-01"),
        ]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 3, 0)
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|w| w.id.as_str()).collect();
        // a2 precedes a1: equal dates keep input order.
        assert_eq!(ids, vec!["a2", "a1", "b"]);
    }

    #[tokio::test]
    async fn test_dedup_across_tiers() {
        // A scheduled work that also qualifies for catch-up appears once.
        let ledger = MemoryLedger::new(vec![scheduled(
            posted_on(work("dup", "2026-01-01"), PlatformId::Instagram),
            "2026-03-01",
        )]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 2, 2)
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["dup"]);
    }

    #[tokio::test]
    async fn test_scheduled_already_posted_not_reemitted() {
        let ledger = MemoryLedger::new(vec![scheduled(
            posted_on(work("done", "2026-01-01"), PlatformId::X),
            "2026-03-01",
        )]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 0, 0)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_limits_cap_tiers_independently() {
        let ledger = MemoryLedger::new(vec![
            posted_on(work("c1", "2026-01-01"), PlatformId::Instagram),
            posted_on(work("c2", "2026-01-02"), PlatformId::Instagram),
            work("b1", "2026-01-03"),
            work("b2", "2026-01-04"),
            work("b3", "2026-01-05"),
        ]);

        let result = select_candidates(&ledger, date("2026-03-01"), PlatformId::X, 2, 1)
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "b1", "b2"]);
    }

    #[tokio::test]
    async fn test_select_catchup_standalone_with_limit() {
        let ledger = MemoryLedger::new(vec![
            posted_on(work("c1", "2026-01-01"), PlatformId::Instagram),
            posted_on(work("c2", "2026-01-02"), PlatformId::Threads),
            posted_on(work("c3", "2026-01-03"), PlatformId::Instagram),
        ]);

        let result = select_catchup(&ledger, PlatformId::X, 2).await.unwrap();
        let ids: Vec<&str> = result.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }
}
