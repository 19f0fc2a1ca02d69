// Capability surface: page driving and payload fetching backends.

pub mod http_fetcher;
pub mod traits;

pub use http_fetcher::HttpFetcher;
pub use traits::{ByteStream, ElementHandle, ElementQuery, FetchResponse, Fetcher, Key, PageDriver};
