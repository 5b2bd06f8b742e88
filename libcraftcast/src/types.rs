//! Core types for Craftcast

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a publishing target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Instagram,
    Threads,
    X,
}

impl PlatformId {
    /// All platforms the engine knows about, in processing order.
    pub fn all() -> [PlatformId; 3] {
        [PlatformId::Instagram, PlatformId::Threads, PlatformId::X]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Instagram => "instagram",
            PlatformId::Threads => "threads",
            PlatformId::X => "x",
        }
    }
}

impl FromStr for PlatformId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instagram" => Ok(PlatformId::Instagram),
            "threads" => Ok(PlatformId::Threads),
            "x" | "twitter" => Ok(PlatformId::X),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: instagram, threads, x",
                s
            )),
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-platform posting state of a work.
///
/// `posted` only ever transitions false to true, together with `post_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformState {
    pub posted: bool,
    pub post_id: Option<String>,
}

/// A single entry in a work's append-only error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub platform: PlatformId,
    pub message: String,
}

/// A finished work as recorded in the ledger.
///
/// Image URLs keep their source ordering; the engine never reorders them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: String,
    pub student: Option<String>,
    pub image_urls: Vec<String>,
    pub completion_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
    pub skip: bool,
    pub caption: Option<String>,
    pub tags: Option<String>,
    pub platforms: BTreeMap<PlatformId, PlatformState>,
    pub error_log: Vec<ErrorEntry>,
}

impl Work {
    /// Posting state for a platform, defaulting to unposted.
    pub fn state(&self, platform: PlatformId) -> PlatformState {
        self.platforms.get(&platform).cloned().unwrap_or_default()
    }

    pub fn is_posted(&self, platform: PlatformId) -> bool {
        self.state(platform).posted
    }

    /// True if the work has been posted on any platform.
    pub fn posted_anywhere(&self) -> bool {
        PlatformId::all().iter().any(|p| self.is_posted(*p))
    }

    /// True if the work has been posted on at least one platform other
    /// than `platform`.
    pub fn posted_elsewhere(&self, platform: PlatformId) -> bool {
        PlatformId::all()
            .iter()
            .any(|p| *p != platform && self.is_posted(*p))
    }
}

/// Supported image MIME types for publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMime {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMime {
    /// Detect MIME type from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl std::fmt::Display for ImageMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Image bytes fetched for a work, reused across that work's platform
/// uploads within a run.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: ImageMime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_with_states(states: &[(PlatformId, bool)]) -> Work {
        let mut platforms = BTreeMap::new();
        for (p, posted) in states {
            platforms.insert(
                *p,
                PlatformState {
                    posted: *posted,
                    post_id: posted.then(|| "id".to_string()),
                },
            );
        }
        Work {
            id: "w1".to_string(),
            title: "Test work".to_string(),
            student: None,
            image_urls: vec!["https://example.com/a.jpg".to_string()],
            completion_date: None,
            scheduled_date: None,
            skip: false,
            caption: None,
            tags: None,
            platforms,
            error_log: Vec::new(),
        }
    }

    #[test]
    fn test_platform_id_from_str() {
        assert_eq!(
            "instagram".parse::<PlatformId>().unwrap(),
            PlatformId::Instagram
        );
        assert_eq!("THREADS".parse::<PlatformId>().unwrap(), PlatformId::Threads);
        assert_eq!("x".parse::<PlatformId>().unwrap(), PlatformId::X);
        assert_eq!("twitter".parse::<PlatformId>().unwrap(), PlatformId::X);
        assert!("mastodon".parse::<PlatformId>().is_err());
    }

    #[test]
    fn test_platform_id_display() {
        assert_eq!(PlatformId::Instagram.to_string(), "instagram");
        assert_eq!(PlatformId::X.to_string(), "x");
    }

    #[test]
    fn test_state_defaults_to_unposted() {
        let work = work_with_states(&[]);
        assert!(!work.is_posted(PlatformId::Instagram));
        assert_eq!(work.state(PlatformId::Instagram).post_id, None);
    }

    #[test]
    fn test_posted_anywhere() {
        let work = work_with_states(&[(PlatformId::Threads, true)]);
        assert!(work.posted_anywhere());
        assert!(!work_with_states(&[]).posted_anywhere());
    }

    #[test]
    fn test_posted_elsewhere_excludes_target() {
        let work = work_with_states(&[(PlatformId::Instagram, true)]);
        assert!(work.posted_elsewhere(PlatformId::X));
        assert!(!work.posted_elsewhere(PlatformId::Instagram));
    }

    #[test]
    fn test_image_mime_from_extension() {
        assert_eq!(ImageMime::from_extension("JPG"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_extension("png"), Some(ImageMime::Png));
        assert_eq!(ImageMime::from_extension("webp"), Some(ImageMime::WebP));
        assert_eq!(ImageMime::from_extension("pdf"), None);
    }

    #[test]
    fn test_work_serialization_round_trip() {
        let work = work_with_states(&[(PlatformId::Instagram, true)]);
        let json = serde_json::to_string(&work).unwrap();
        let back: Work = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, work.id);
        assert!(back.is_posted(PlatformId::Instagram));
    }
}
