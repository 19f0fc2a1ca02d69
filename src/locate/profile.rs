// Origin profile: every origin-specific query, marker and blocked-page pattern.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::driver::ElementQuery;
use crate::engine::record::MediaKind;

/// A single element query plus the payload host fragments it must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocateStrategy {
    pub query: ElementQuery,
    /// Empty means any payload URL is accepted.
    #[serde(default)]
    pub host_fragments: Vec<String>,
}

impl LocateStrategy {
    pub fn new(query: &str, host_fragments: &[&str]) -> Self {
        Self {
            query: ElementQuery::new(query),
            host_fragments: host_fragments.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn accepts_payload(&self, payload_url: &str) -> bool {
        self.host_fragments.is_empty()
            || self
                .host_fragments
                .iter()
                .any(|fragment| payload_url.contains(fragment.as_str()))
    }
}

/// Decides whether a location is an authentication or verification page.
pub trait LocationGuard: Send + Sync {
    fn is_blocked(&self, location: &str) -> bool;
}

/// Case-insensitive substring patterns marking blocked locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockedPatterns(Vec<String>);

impl BlockedPatterns {
    pub fn new(patterns: Vec<String>) -> Self {
        Self(patterns.into_iter().map(|p| p.to_lowercase()).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BlockedPatterns {
    fn default() -> Self {
        Self::new(vec![
            "login".to_string(),
            "checkpoint".to_string(),
            "two_step_verification".to_string(),
        ])
    }
}

impl LocationGuard for BlockedPatterns {
    fn is_blocked(&self, location: &str) -> bool {
        let location = location.to_lowercase();
        self.0.iter().any(|pattern| location.contains(pattern.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorProfile {
    /// Ordered most specific first; the first accepted candidate wins.
    pub image_strategies: Vec<LocateStrategy>,
    pub video_strategies: Vec<LocateStrategy>,
    /// Thumbnails on the album page that open the media viewer.
    pub first_item_queries: Vec<ElementQuery>,
    /// Link fragments accepted for a first item in addition to the album id.
    pub first_item_link_markers: Vec<String>,
    /// Query parameter of the start location carrying the album id.
    pub album_id_param: String,
    /// Queries whose joint emptiness signals the end of the gallery.
    pub presence_queries: Vec<ElementQuery>,
    pub title_queries: Vec<ElementQuery>,
    /// Location fragment marking a video page.
    pub video_location_marker: String,
    pub blocked_patterns: BlockedPatterns,
}

impl Default for LocatorProfile {
    fn default() -> Self {
        Self {
            image_strategies: vec![
                LocateStrategy::new(
                    "img[data-visualcompletion='media-vc-image']",
                    &["scontent", "fbcdn"],
                ),
                LocateStrategy::new("img[src*='scontent']", &["scontent", "fbcdn"]),
                LocateStrategy::new("img[src*='fbcdn']", &["scontent", "fbcdn"]),
            ],
            video_strategies: vec![
                LocateStrategy::new("video[src*='fbcdn']", &["fbcdn", "video-ak"]),
                LocateStrategy::new("video[data-sigil='inline-video']", &["fbcdn", "video-ak"]),
                LocateStrategy::new("video[src*='video-ak']", &["fbcdn", "video-ak"]),
                LocateStrategy::new("[data-video-id] video", &["fbcdn", "video-ak"]),
                LocateStrategy::new("video", &[]),
            ],
            first_item_queries: [
                "a[href*='/photo/'] img",
                "a[href*='/videos/'] video",
                "div[role='img'] img",
                "[data-pagelet*='Photo'] img",
                "img[src*='scontent']",
                "img[src*='fbcdn']",
                "video[src*='fbcdn']",
            ]
            .into_iter()
            .map(ElementQuery::from)
            .collect(),
            first_item_link_markers: vec!["/videos/".to_string()],
            album_id_param: "set".to_string(),
            presence_queries: [
                "img[data-visualcompletion='media-vc-image']",
                "video[src*='fbcdn']",
                "video[data-sigil='inline-video']",
                "video[src*='video-ak']",
            ]
            .into_iter()
            .map(ElementQuery::from)
            .collect(),
            title_queries: [
                "h1",
                "[data-pagelet='MediaViewerPhoto'] h1",
                "[role='main'] h1",
                "div[dir='auto'] h1",
                "span[dir='auto']",
            ]
            .into_iter()
            .map(ElementQuery::from)
            .collect(),
            video_location_marker: "/videos/".to_string(),
            blocked_patterns: BlockedPatterns::default(),
        }
    }
}

impl LocatorProfile {
    pub fn strategies_for(&self, kind: MediaKind) -> &[LocateStrategy] {
        match kind {
            MediaKind::Image => &self.image_strategies,
            MediaKind::Video => &self.video_strategies,
        }
    }

    pub fn kind_for_location(&self, location: &str) -> MediaKind {
        if !self.video_location_marker.is_empty() && location.contains(&self.video_location_marker)
        {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    /// Album id carried by the start location, or an empty string.
    pub fn album_id(&self, start_location: &str) -> String {
        Url::parse(start_location)
            .ok()
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == self.album_id_param.as_str())
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or_default()
    }

    /// Whether a thumbnail link belongs to the album being traversed.
    pub fn is_album_link(&self, href: &str, album_id: &str) -> bool {
        (!album_id.is_empty() && href.contains(album_id))
            || self
                .first_item_link_markers
                .iter()
                .any(|marker| href.contains(marker.as_str()))
    }
}
