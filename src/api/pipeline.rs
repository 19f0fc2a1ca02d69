// Control operations: what a control surface calls, composed into album pipelines.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::driver::{Fetcher, PageDriver};
use crate::engine::downloader::{DownloadManager, DownloadResult};
use crate::engine::gate::AuthGate;
use crate::engine::progress::{ProgressSink, Reporter};
use crate::engine::record::MediaRecord;
use crate::engine::store::CollectionStore;
use crate::engine::traversal::{
    CollectionResult, TraversalEngine, TraversalOutcome, TraversalRequest,
};
use crate::error::{HarvestError, HarvestResult};
use crate::locate::{LocationGuard, MediaLocator};

/// Traverse a gallery into a checkpointed store.
pub async fn collect(
    driver: Arc<dyn PageDriver>,
    config: &EngineConfig,
    request: &TraversalRequest,
    cancel: CancellationToken,
    sink: Arc<dyn ProgressSink>,
) -> HarvestResult<CollectionResult> {
    TraversalEngine::new(driver, config.clone(), cancel, Reporter::new(sink))
        .collect(request)
        .await
}

/// Retrieve the payloads of `records` into `target_dir`.
pub async fn download(
    fetcher: Arc<dyn Fetcher>,
    config: &EngineConfig,
    records: &[MediaRecord],
    target_dir: &Path,
    item_cap: usize,
    cancel: CancellationToken,
    sink: Arc<dyn ProgressSink>,
) -> DownloadResult {
    DownloadManager::new(
        fetcher,
        config.download_delay(),
        config.fetch_timeout(),
        cancel,
        Reporter::new(sink),
    )
    .download_all(records, target_dir, item_cap)
    .await
}

/// Replace characters that are not allowed in directory names.
pub fn sanitize_album_name(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn fallback_album_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("Album_{}", secs)
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub album_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub collection: Option<CollectionResult>,
    pub download: Option<DownloadResult>,
}

/// One browsing session plus one fetcher, driven strictly in sequence.
pub struct Pipeline {
    driver: Arc<dyn PageDriver>,
    fetcher: Arc<dyn Fetcher>,
    guard: Arc<dyn LocationGuard>,
    config: EngineConfig,
    cancel: CancellationToken,
    sink: Arc<dyn ProgressSink>,
    reporter: Reporter,
}

impl Pipeline {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        fetcher: Arc<dyn Fetcher>,
        config: EngineConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let guard = Arc::new(config.profile.blocked_patterns.clone());
        Self {
            driver,
            fetcher,
            guard,
            config,
            cancel: CancellationToken::new(),
            reporter: Reporter::new(sink.clone()),
            sink,
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn LocationGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Share an externally owned stop signal.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cooperative stop; takes effect between steps.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.reporter.info("Stop requested by user");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn album_paths(&self, root: &Path, album_name: &str) -> (PathBuf, PathBuf) {
        let album_dir = root.join(album_name);
        let checkpoint = album_dir.join(&self.config.checkpoint_file_name);
        (album_dir, checkpoint)
    }

    pub async fn collect(&self, request: &TraversalRequest) -> HarvestResult<CollectionResult> {
        TraversalEngine::new(
            self.driver.clone(),
            self.config.clone(),
            self.cancel.clone(),
            self.reporter.clone(),
        )
        .with_guard(self.guard.clone())
        .collect(request)
        .await
    }

    pub async fn download(
        &self,
        records: &[MediaRecord],
        target_dir: &Path,
        item_cap: usize,
    ) -> DownloadResult {
        download(
            self.fetcher.clone(),
            &self.config,
            records,
            target_dir,
            item_cap,
            self.cancel.clone(),
            self.sink.clone(),
        )
        .await
    }

    /// Wait out login/verification, then collect links into `<root>/<album_title>`.
    pub async fn grab_links(
        &self,
        album_url: &str,
        root: &Path,
        album_title: &str,
        item_cap: usize,
    ) -> HarvestResult<PipelineReport> {
        self.reporter
            .info(format!("Starting to grab links for album: {}", album_url));
        self.ensure_unblocked(album_url).await?;

        let (album_dir, checkpoint) = self.album_paths(root, &sanitize_album_name(album_title));
        self.create_album_dir(&album_dir).await?;
        self.reporter.progress(30, 100, "Collecting media URLs...");

        let collection = self
            .collect(&TraversalRequest {
                start_location: album_url.to_string(),
                item_cap,
                checkpoint: Some(checkpoint.clone()),
                resume_anchor: None,
            })
            .await?;
        self.report_collection(&collection);

        Ok(PipelineReport {
            album_dir,
            checkpoint,
            collection: Some(collection),
            download: None,
        })
    }

    /// Continue a previous collection from the last record of `checkpoint`.
    pub async fn resume_grab_links(
        &self,
        album_url: &str,
        checkpoint: &Path,
        item_cap: usize,
    ) -> HarvestResult<PipelineReport> {
        self.reporter
            .info(format!("Resuming link grabbing for album: {}", album_url));
        self.ensure_unblocked(album_url).await?;

        let existing = CollectionStore::load(checkpoint)
            .map_err(|e| HarvestError::Persistence(format!("{:#}", e)))?;
        let Some(last) = existing.last() else {
            self.reporter
                .error("No URLs found in checkpoint to resume from");
            return Err(anyhow!("checkpoint {} holds no records", checkpoint.display()).into());
        };
        self.reporter.progress(30, 100, "Resuming media URL collection...");

        let collection = self
            .collect(&TraversalRequest {
                start_location: album_url.to_string(),
                item_cap,
                checkpoint: Some(checkpoint.to_path_buf()),
                resume_anchor: Some(last.canonical_url.clone()),
            })
            .await?;
        self.report_collection(&collection);

        Ok(PipelineReport {
            album_dir: checkpoint
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            checkpoint: checkpoint.to_path_buf(),
            collection: Some(collection),
            download: None,
        })
    }

    /// Download every record of `checkpoint` into `<root>/<checkpoint's directory name>`.
    pub async fn download_from_checkpoint(
        &self,
        checkpoint: &Path,
        root: &Path,
        item_cap: usize,
    ) -> HarvestResult<PipelineReport> {
        let records = CollectionStore::load(checkpoint)
            .map_err(|e| HarvestError::Persistence(format!("{:#}", e)))?;
        if records.is_empty() {
            self.reporter.error("No URLs found in checkpoint");
            return Err(anyhow!("checkpoint {} holds no records", checkpoint.display()).into());
        }

        let album_name = checkpoint
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                let name = fallback_album_name();
                self.reporter.warn(format!(
                    "Could not determine album title from checkpoint path, using: {}",
                    name
                ));
                name
            });
        let album_dir = root.join(&album_name);

        self.reporter.progress(90, 100, "Starting media downloads...");
        let download = self.download(&records, &album_dir, item_cap).await;
        self.reporter.info(format!(
            "Download completed. Saved {} media items",
            download.satisfied
        ));
        self.reporter.progress(100, 100, "Download completed!");

        Ok(PipelineReport {
            album_dir,
            checkpoint: checkpoint.to_path_buf(),
            collection: None,
            download: Some(download),
        })
    }

    /// Full run: gate, album title, collection, then download.
    pub async fn scrape_album(
        &self,
        album_url: &str,
        root: &Path,
        item_cap: usize,
    ) -> HarvestResult<PipelineReport> {
        self.reporter
            .info(format!("Starting scrape of album: {}", album_url));
        self.ensure_unblocked(album_url).await?;

        self.reporter
            .progress(20, 100, "Extracting album information...");
        let album_name = self.discover_album_name().await;
        let (album_dir, checkpoint) = self.album_paths(root, &album_name);
        self.create_album_dir(&album_dir).await?;

        self.reporter.progress(30, 100, "Collecting media URLs...");
        let collection = self
            .collect(&TraversalRequest {
                start_location: album_url.to_string(),
                item_cap,
                checkpoint: Some(checkpoint.clone()),
                resume_anchor: None,
            })
            .await?;
        self.report_collection(&collection);

        // Partial collections from an aborted or blocked run are still downloaded.
        let proceed = !collection.records.is_empty()
            && collection.outcome != TraversalOutcome::Cancelled;
        let download = if proceed {
            self.reporter.progress(90, 100, "Starting media downloads...");
            let result = self
                .download(&collection.records, &album_dir, item_cap)
                .await;
            self.reporter.info(format!(
                "Scraping completed. Saved {} media items to {}",
                result.satisfied,
                album_dir.display()
            ));
            self.reporter.progress(100, 100, "Scraping completed!");
            Some(result)
        } else {
            None
        };

        Ok(PipelineReport {
            album_dir,
            checkpoint,
            collection: Some(collection),
            download,
        })
    }

    async fn ensure_unblocked(&self, album_url: &str) -> HarvestResult<()> {
        if self.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        self.reporter.progress(10, 100, "Waiting for login...");
        AuthGate {
            driver: self.driver.as_ref(),
            guard: self.guard.as_ref(),
            timeout: self.config.auth_timeout(),
            poll_interval: self.config.auth_poll_interval(),
            navigation_timeout: self.config.navigation_timeout(),
        }
        .wait_until_unblocked(album_url, &self.cancel, &self.reporter)
        .await
    }

    async fn discover_album_name(&self) -> String {
        let locator = MediaLocator::new(
            self.driver.clone(),
            self.config.profile.clone(),
            self.config.min_media_dimension,
        );
        match locator.album_title().await.map(|t| sanitize_album_name(&t)) {
            Some(title) if !title.is_empty() => {
                self.reporter.info(format!("Found album title: {}", title));
                title
            }
            _ => {
                let name = fallback_album_name();
                self.reporter
                    .warn(format!("Could not find album title, using: {}", name));
                name
            }
        }
    }

    async fn create_album_dir(&self, album_dir: &Path) -> HarvestResult<()> {
        tokio::fs::create_dir_all(album_dir).await?;
        Ok(())
    }

    fn report_collection(&self, collection: &CollectionResult) {
        if let Some(err) = collection.fatal_error() {
            self.reporter.error(err.to_string());
        }
        if collection.records.is_empty() {
            self.reporter.error("No media URLs collected");
        } else {
            self.reporter.info(format!(
                "Successfully saved {} URLs",
                collection.records.len()
            ));
            self.reporter.progress(100, 100, "URL collection completed!");
        }
    }
}
