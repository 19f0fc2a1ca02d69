// Media locator: finds the payload shown on the current page by ordered query strategies.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use super::profile::LocatorProfile;
use crate::driver::{ElementHandle, ElementQuery, PageDriver};
use crate::engine::record::{MediaKind, MediaRecord};

const WIDTH_ATTRIBUTES: [&str; 2] = ["width", "naturalWidth"];
const HEIGHT_ATTRIBUTES: [&str; 2] = ["height", "naturalHeight"];

pub struct MediaLocator {
    driver: Arc<dyn PageDriver>,
    profile: LocatorProfile,
    min_dimension: u32,
}

impl MediaLocator {
    pub fn new(driver: Arc<dyn PageDriver>, profile: LocatorProfile, min_dimension: u32) -> Self {
        Self {
            driver,
            profile,
            min_dimension,
        }
    }

    pub fn profile(&self) -> &LocatorProfile {
        &self.profile
    }

    /// Locate the displayed item. `Ok(None)` is a locator miss, not an error;
    /// only a failure to read the current location is raised.
    ///
    /// Strategies are tried in profile order and candidates must be visible and
    /// at least `min_dimension` on both axes; ties go to the earlier strategy.
    pub async fn locate(&self, kind_hint: Option<MediaKind>) -> Result<Option<MediaRecord>> {
        let location = self.driver.current_location().await?;
        let kind = kind_hint.unwrap_or_else(|| self.profile.kind_for_location(&location));

        for strategy in self.profile.strategies_for(kind) {
            for element in self.candidates(&strategy.query).await {
                if !self.is_acceptable(&element).await {
                    continue;
                }
                let payload = match self.driver.read_attribute(&element, "src").await {
                    Ok(Some(src)) if !src.trim().is_empty() => src,
                    _ => continue,
                };
                if !strategy.accepts_payload(&payload) {
                    continue;
                }
                debug!(
                    "located {} via {} payload={}",
                    kind.label(),
                    strategy.query.as_str(),
                    payload
                );
                return Ok(Some(MediaRecord::new(payload, kind, location)));
            }
        }

        debug!("locator miss kind={} location={}", kind.label(), location);
        Ok(None)
    }

    /// Click the first album thumbnail that opens an item of this album.
    /// Returns `false` when no strategy yields a usable thumbnail.
    pub async fn select_first_item(&self, start_location: &str) -> Result<bool> {
        let album_id = self.profile.album_id(start_location);

        for query in &self.profile.first_item_queries {
            for element in self.candidates(query).await {
                if !self.is_acceptable(&element).await {
                    continue;
                }
                let href = match self.driver.read_attribute(&element, "href").await {
                    Ok(Some(href)) => href,
                    _ => continue,
                };
                if !self.profile.is_album_link(&href, &album_id) {
                    continue;
                }
                self.driver.click(&element).await?;
                debug!("selected first item via {} href={}", query.as_str(), href);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether any gallery media element exists on the page, visible or not.
    pub async fn media_present(&self) -> bool {
        for query in &self.profile.presence_queries {
            if !self.candidates(query).await.is_empty() {
                return true;
            }
        }
        false
    }

    /// First title-like text on the page, if any.
    pub async fn album_title(&self) -> Option<String> {
        for query in &self.profile.title_queries {
            for element in self.candidates(query).await {
                let text = match self.driver.read_attribute(&element, "textContent").await {
                    Ok(Some(text)) => text,
                    _ => continue,
                };
                let text = text.trim();
                let len = text.chars().count();
                if len > 3 && len < 100 {
                    return Some(text.to_string());
                }
            }
        }
        None
    }

    async fn candidates(&self, query: &ElementQuery) -> Vec<ElementHandle> {
        match self.driver.find_candidates(query).await {
            Ok(elements) => elements,
            Err(e) => {
                debug!("query {} failed: {}", query.as_str(), e);
                Vec::new()
            }
        }
    }

    async fn is_acceptable(&self, element: &ElementHandle) -> bool {
        if !matches!(self.driver.is_visible(element).await, Ok(true)) {
            return false;
        }
        let width = self.dimension(element, WIDTH_ATTRIBUTES).await;
        let height = self.dimension(element, HEIGHT_ATTRIBUTES).await;
        meets_minimum(width.as_deref(), self.min_dimension)
            && meets_minimum(height.as_deref(), self.min_dimension)
    }

    async fn dimension(&self, element: &ElementHandle, names: [&str; 2]) -> Option<String> {
        for name in names {
            if let Ok(Some(value)) = self.driver.read_attribute(element, name).await {
                if !value.trim().is_empty() {
                    return Some(value);
                }
            }
        }
        None
    }
}

/// Missing dimensions pass; unparseable ones fail.
fn meets_minimum(value: Option<&str>, min: u32) -> bool {
    match value {
        None => true,
        Some(raw) => raw
            .trim()
            .trim_end_matches("px")
            .parse::<f64>()
            .map(|v| v >= f64::from(min))
            .unwrap_or(false),
    }
}
