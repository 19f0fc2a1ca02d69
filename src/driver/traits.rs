use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Opaque reference to an element on the page currently shown by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Element description understood by the driver backend (a CSS selector for browsers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementQuery(String);

impl ElementQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementQuery {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Advances the media viewer to the next item.
    ArrowRight,
}

/// One logical browsing session. Never driven concurrently.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, location: &str) -> Result<()>;
    async fn current_location(&self) -> Result<String>;
    async fn find_candidates(&self, query: &ElementQuery) -> Result<Vec<ElementHandle>>;
    async fn is_visible(&self, element: &ElementHandle) -> Result<bool>;
    /// Reads an attribute or DOM property. For `href` on an element that is not
    /// itself a link, backends resolve the closest enclosing link.
    async fn read_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;
    async fn click(&self, element: &ElementHandle) -> Result<()>;
    async fn press_key(&self, key: Key) -> Result<()>;
    async fn reload(&self) -> Result<()>;
}

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

pub struct FetchResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Streaming GET. Non-success statuses are returned, not raised.
    async fn get(&self, url: &str) -> Result<FetchResponse>;
}
