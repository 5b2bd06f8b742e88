//! Sub-post planning for carousel caps
//!
//! Platforms cap the number of images in one post. A work exceeding the cap
//! is split here, in the formatting layer, into numbered sub-posts on
//! consecutive dates; publish mechanics are unaware of the split.

use chrono::{Days, NaiveDate};

use crate::types::Work;

/// One planned sub-post of a work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPost {
    /// 1-based part number.
    pub seq: usize,
    /// Total number of parts in the plan.
    pub total: usize,
    /// The date this part is due to be published.
    pub date: NaiveDate,
    /// Index of this part's first image in the work's image list.
    pub offset: usize,
    /// The image URLs covered by this part, in source order.
    pub image_urls: Vec<String>,
}

impl SubPost {
    /// Caption part marker, e.g. ` (2/3)`. Empty for single-part plans.
    pub fn caption_suffix(&self) -> String {
        if self.total > 1 {
            format!(" ({}/{})", self.seq, self.total)
        } else {
            String::new()
        }
    }
}

/// Split a work into sub-posts for a platform cap, anchored at `anchor`.
///
/// Each part carries at most `cap` images in source order; part `i` is
/// dated `anchor + (i - 1)` days. Works within the cap yield a single
/// part dated `anchor`.
pub fn subpost_plan(work: &Work, cap: usize, anchor: NaiveDate) -> Vec<SubPost> {
    assert!(cap > 0, "carousel cap must be positive");

    let chunks: Vec<&[String]> = work.image_urls.chunks(cap).collect();
    let total = chunks.len().max(1);

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| SubPost {
            seq: i + 1,
            total,
            date: anchor
                .checked_add_days(Days::new(i as u64))
                .unwrap_or(anchor),
            offset: i * cap,
            image_urls: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn work_with_images(n: usize) -> Work {
        Work {
            id: "w1".to_string(),
            title: "Large work".to_string(),
            student: None,
            image_urls: (0..n)
                .map(|i| format!("https://example.com/img_{:02}.jpg", i))
                .collect(),
            completion_date: None,
            scheduled_date: None,
            skip: false,
            caption: None,
            tags: None,
            platforms: BTreeMap::new(),
            error_log: Vec::new(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_twelve_images_on_ten_cap_splits_in_two() {
        let work = work_with_images(12);
        let plan = subpost_plan(&work, 10, date("2026-03-01"));

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].seq, 1);
        assert_eq!(plan[0].total, 2);
        assert_eq!(plan[0].image_urls.len(), 10);
        assert_eq!(plan[0].date, date("2026-03-01"));
        assert_eq!(plan[1].seq, 2);
        assert_eq!(plan[1].image_urls.len(), 2);
        assert_eq!(plan[1].date, date("2026-03-02"));
    }

    #[test]
    fn test_under_cap_is_single_part() {
        let work = work_with_images(3);
        let plan = subpost_plan(&work, 10, date("2026-03-01"));

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].total, 1);
        assert_eq!(plan[0].caption_suffix(), "");
        assert_eq!(plan[0].date, date("2026-03-01"));
    }

    #[test]
    fn test_image_order_preserved_across_parts() {
        let work = work_with_images(12);
        let plan = subpost_plan(&work, 10, date("2026-03-01"));

        let reassembled: Vec<String> = plan
            .iter()
            .flat_map(|p| p.image_urls.iter().cloned())
            .collect();
        assert_eq!(reassembled, work.image_urls);
        assert_eq!(plan[1].offset, 10);
    }

    #[test]
    fn test_caption_suffix_numbering() {
        let work = work_with_images(9);
        let plan = subpost_plan(&work, 4, date("2026-03-01"));

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].caption_suffix(), " (1/3)");
        assert_eq!(plan[2].caption_suffix(), " (3/3)");
        assert_eq!(plan[2].image_urls.len(), 1);
        assert_eq!(plan[2].date, date("2026-03-03"));
    }
}
