#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use gallery_harvest_engine::driver::{
    ElementHandle, ElementQuery, FetchResponse, Fetcher, Key, PageDriver,
};
use gallery_harvest_engine::locate::LocatorProfile;
use gallery_harvest_engine::{
    EngineConfig, HarvestEvent, LogLevel, MediaKind, MediaRecord, ProgressSink, SpeedPreset,
};

pub const ALBUM_URL: &str = "https://www.facebook.com/media/set/?set=a.42";
pub const END_URL: &str = "https://www.facebook.com/media/set/?set=a.42&end=1";
pub const LOGIN_URL: &str = "https://www.facebook.com/login/?next=album";

const MEDIA: &str = "media";
const TITLE: &str = "title";

pub fn item_url(i: usize) -> String {
    format!("https://www.facebook.com/photo/?fbid={}&set=a.42", i)
}

pub fn video_url(i: usize) -> String {
    format!("https://www.facebook.com/owner/videos/{}/", i)
}

pub fn image_payload(i: usize) -> String {
    format!("https://scontent.example.net/v/{}.jpg?oh=abc", i)
}

pub fn video_payload(i: usize) -> String {
    format!("https://video-ak.fbcdn.example.net/v/{}.mp4", i)
}

/// Per-item rendering fault: the media element is present but hidden, and
/// the next-item key does nothing while the fault is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glitch {
    None,
    UntilReload,
    Permanent,
}

#[derive(Debug, Clone)]
pub struct GalleryItem {
    pub canonical: String,
    pub payload: String,
    pub kind: MediaKind,
    pub glitch: Glitch,
}

impl GalleryItem {
    pub fn image(i: usize) -> Self {
        Self {
            canonical: item_url(i),
            payload: image_payload(i),
            kind: MediaKind::Image,
            glitch: Glitch::None,
        }
    }

    pub fn video(i: usize) -> Self {
        Self {
            canonical: video_url(i),
            payload: video_payload(i),
            kind: MediaKind::Video,
            glitch: Glitch::None,
        }
    }

    pub fn glitched(mut self, glitch: Glitch) -> Self {
        self.glitch = glitch;
        self
    }

    pub fn record(&self) -> MediaRecord {
        MediaRecord::new(self.payload.clone(), self.kind, self.canonical.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Album,
    Item(usize),
    End,
}

struct GalleryState {
    page: Page,
    glitches: Vec<Glitch>,
    /// Location reads still answered with the login page.
    login_reads_left: usize,
    /// Location reads still answered with an error.
    failing_reads_left: usize,
    /// Failing reads armed by the next reload.
    failing_reads_on_reload: usize,
    login_on_reload: bool,
    navigations: Vec<String>,
    reloads: usize,
    key_presses: usize,
    clicks: usize,
}

/// In-memory album viewer answering the default profile's queries.
pub struct GalleryDriver {
    profile: LocatorProfile,
    items: Vec<GalleryItem>,
    title: Option<String>,
    state: Mutex<GalleryState>,
}

impl GalleryDriver {
    pub fn new(items: Vec<GalleryItem>) -> Self {
        let glitches = items.iter().map(|item| item.glitch).collect();
        Self {
            profile: LocatorProfile::default(),
            items,
            title: None,
            state: Mutex::new(GalleryState {
                page: Page::Album,
                glitches,
                login_reads_left: 0,
                failing_reads_left: 0,
                failing_reads_on_reload: 0,
                login_on_reload: false,
                navigations: Vec::new(),
                reloads: 0,
                key_presses: 0,
                clicks: 0,
            }),
        }
    }

    pub fn images(count: usize) -> Self {
        Self::new((1..=count).map(GalleryItem::image).collect())
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Answer the next `reads` location reads with the login page.
    pub fn require_login(self, reads: usize) -> Self {
        self.state.lock().login_reads_left = reads;
        self
    }

    /// Fail the next `reads` location reads.
    pub fn fail_location_reads(self, reads: usize) -> Self {
        self.state.lock().failing_reads_left = reads;
        self
    }

    /// After the next reload, fail the following `reads` location reads.
    pub fn fail_location_reads_after_reload(self, reads: usize) -> Self {
        self.state.lock().failing_reads_on_reload = reads;
        self
    }

    /// Any reload lands the session on the login page for good.
    pub fn login_after_reload(self) -> Self {
        self.state.lock().login_on_reload = true;
        self
    }

    pub fn records(&self) -> Vec<MediaRecord> {
        self.items.iter().map(GalleryItem::record).collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state.lock().reloads
    }

    pub fn key_presses(&self) -> usize {
        self.state.lock().key_presses
    }

    pub fn clicks(&self) -> usize {
        self.state.lock().clicks
    }

    fn glitch_active(state: &GalleryState, index: usize) -> bool {
        state.glitches[index] != Glitch::None
    }

    fn item_queries(&self, kind: MediaKind) -> impl Iterator<Item = &ElementQuery> {
        self.profile
            .strategies_for(kind)
            .iter()
            .map(|strategy| &strategy.query)
    }
}

#[async_trait]
impl PageDriver for GalleryDriver {
    async fn navigate(&self, location: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.navigations.push(location.to_string());
        state.page = if location == ALBUM_URL {
            Page::Album
        } else if let Some(i) = self.items.iter().position(|item| item.canonical == location) {
            Page::Item(i)
        } else {
            Page::End
        };
        Ok(())
    }

    async fn current_location(&self) -> Result<String> {
        let mut state = self.state.lock();
        if state.failing_reads_left > 0 {
            state.failing_reads_left -= 1;
            bail!("devtools session dropped the request");
        }
        if state.login_reads_left > 0 {
            state.login_reads_left -= 1;
            return Ok(LOGIN_URL.to_string());
        }
        Ok(match state.page {
            Page::Album => ALBUM_URL.to_string(),
            Page::Item(i) => self.items[i].canonical.clone(),
            Page::End => END_URL.to_string(),
        })
    }

    async fn find_candidates(&self, query: &ElementQuery) -> Result<Vec<ElementHandle>> {
        let state = self.state.lock();
        if self.title.is_some() && self.profile.title_queries.first() == Some(query) {
            return Ok(vec![ElementHandle::new(TITLE)]);
        }
        match state.page {
            Page::Album if self.profile.first_item_queries.first() == Some(query) => Ok((0
                ..self.items.len())
                .map(|i| ElementHandle::new(format!("thumb-{}", i)))
                .collect()),
            Page::Item(i) => {
                let kind = self.items[i].kind;
                let matches = self.profile.presence_queries.contains(query)
                    || self.item_queries(kind).any(|q| q == query);
                if matches {
                    Ok(vec![ElementHandle::new(MEDIA)])
                } else {
                    Ok(Vec::new())
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool> {
        let state = self.state.lock();
        match (element.id(), state.page) {
            (MEDIA, Page::Item(i)) => Ok(!Self::glitch_active(&state, i)),
            (MEDIA, _) => bail!("stale element"),
            _ => Ok(true),
        }
    }

    async fn read_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let state = self.state.lock();
        if element.id() == TITLE {
            return Ok(match name {
                "textContent" => self.title.clone(),
                _ => None,
            });
        }
        if let Some(index) = element.id().strip_prefix("thumb-") {
            let i: usize = index.parse()?;
            return Ok(match name {
                "href" => Some(self.items[i].canonical.clone()),
                "width" | "height" => Some("320".to_string()),
                _ => None,
            });
        }
        let Page::Item(i) = state.page else {
            bail!("stale element");
        };
        Ok(match name {
            "src" => Some(self.items[i].payload.clone()),
            "width" | "height" => Some("720".to_string()),
            _ => None,
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.clicks += 1;
        let index = element
            .id()
            .strip_prefix("thumb-")
            .ok_or_else(|| anyhow!("element {} is not clickable", element.id()))?;
        state.page = Page::Item(index.parse()?);
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        let mut state = self.state.lock();
        state.key_presses += 1;
        let Key::ArrowRight = key;
        if let Page::Item(i) = state.page {
            if Self::glitch_active(&state, i) {
                return Ok(());
            }
            state.page = if i + 1 < self.items.len() {
                Page::Item(i + 1)
            } else {
                Page::End
            };
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.reloads += 1;
        state.failing_reads_left = std::mem::take(&mut state.failing_reads_on_reload);
        if state.login_on_reload {
            state.login_reads_left = usize::MAX;
        }
        if let Page::Item(i) = state.page {
            if state.glitches[i] == Glitch::UntilReload {
                state.glitches[i] = Glitch::None;
            }
        }
        Ok(())
    }
}

/// Fetcher double: scripted status and body per URL; unknown URLs fail to connect.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: HashMap<String, (u16, Vec<u8>)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving(records: &[MediaRecord]) -> Self {
        let mut fetcher = Self::new();
        for record in records {
            fetcher = fetcher.respond(&record.payload_url, 200, record.payload_url.as_bytes());
        }
        fetcher
    }

    pub fn respond(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.responses
            .insert(url.to_string(), (status, body.to_vec()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        self.calls.lock().push(url.to_string());
        let (status, body) = self
            .responses
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", url))?;
        // Two chunks, so the body is really streamed.
        let mid = body.len() / 2;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&body[..mid])),
            Ok(Bytes::copy_from_slice(&body[mid..])),
        ];
        Ok(FetchResponse {
            status,
            body: stream::iter(chunks).boxed(),
        })
    }
}

/// Collects every emitted event for later inspection.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<HarvestEvent>>>);

impl EventLog {
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        let events = self.0.clone();
        Arc::new(move |event: HarvestEvent| events.lock().push(event))
    }

    pub fn events(&self) -> Vec<HarvestEvent> {
        self.0.lock().clone()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HarvestEvent::Log { level: l, message } if l == level => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|event| match event {
            HarvestEvent::Log { message, .. } | HarvestEvent::Progress { message, .. } => {
                message.contains(needle)
            }
        })
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        speed: SpeedPreset::Fast,
        auth_timeout_secs: 5,
        auth_poll_ms: 100,
        ..EngineConfig::default()
    }
}
