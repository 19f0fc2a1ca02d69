// Engine orchestration: traversal, checkpointing and download coordination.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};

pub mod downloader;
pub mod gate;
pub mod progress;
pub mod record;
pub mod store;
pub mod traversal;

/// Run a single driver or fetcher call under a time limit.
pub(crate) async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("timed out after {:?}", limit)),
    }
}
