// Sequential payload downloader: resumes from the first missing ordinal file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bounded;
use super::progress::Reporter;
use super::record::{target_file_name, MediaRecord};
use crate::driver::Fetcher;
use crate::error::HarvestError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadResult {
    /// Items whose target file exists after the run, skipped ones included.
    pub satisfied: usize,
    /// `min(records, limit)`.
    pub total: usize,
    /// Items transferred during this run.
    pub fetched: usize,
    /// Items found on disk past the resume point.
    pub skipped: usize,
    /// Ordinals whose transfer failed.
    pub failed: Vec<usize>,
    pub cancelled: bool,
}

/// First 1-based ordinal whose target file is absent, or `records.len() + 1`.
///
/// Files are assumed contiguous from `001`: nothing after the first gap is
/// inspected, so a later file that exists is not noticed here.
pub fn resume_index(records: &[MediaRecord], target_dir: &Path) -> usize {
    for (i, record) in records.iter().enumerate() {
        let ordinal = i + 1;
        if !target_path(target_dir, ordinal, record).exists() {
            return ordinal;
        }
    }
    records.len() + 1
}

pub fn target_path(target_dir: &Path, ordinal: usize, record: &MediaRecord) -> PathBuf {
    target_dir.join(target_file_name(ordinal, record.kind))
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

pub struct DownloadManager {
    fetcher: Arc<dyn Fetcher>,
    pacing: Duration,
    fetch_timeout: Duration,
    cancel: CancellationToken,
    reporter: Reporter,
}

impl DownloadManager {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        pacing: Duration,
        fetch_timeout: Duration,
        cancel: CancellationToken,
        reporter: Reporter,
    ) -> Self {
        Self {
            fetcher,
            pacing,
            fetch_timeout,
            cancel,
            reporter,
        }
    }

    /// Download ordinals `resume_index..=min(len, limit)` one at a time.
    ///
    /// A failed item is logged and skipped; the batch always runs to the end
    /// unless cancelled between items.
    pub async fn download_all(
        &self,
        records: &[MediaRecord],
        target_dir: &Path,
        limit: usize,
    ) -> DownloadResult {
        let total = records.len().min(limit);
        let start = resume_index(records, target_dir);
        if start > 1 {
            self.reporter
                .info(format!("Resuming from media {}/{}", start, records.len()));
        }

        let mut result = DownloadResult {
            satisfied: (start - 1).min(total),
            total,
            ..DownloadResult::default()
        };

        self.reporter
            .info(format!("Starting download of {} media items", total));
        self.reporter
            .progress(result.satisfied, total, "Starting download...");

        if start <= total {
            if let Err(e) = tokio::fs::create_dir_all(target_dir).await {
                self.reporter.error(format!(
                    "Cannot create target directory {}: {}",
                    target_dir.display(),
                    e
                ));
                result.failed.extend(start..=total);
                return result;
            }
        }

        for ordinal in start..=total {
            if self.cancel.is_cancelled() {
                self.reporter.warn("Download stopped by user");
                result.cancelled = true;
                break;
            }

            let record = &records[ordinal - 1];
            let kind = record.kind.label();
            let path = target_path(target_dir, ordinal, record);
            let file_name = target_file_name(ordinal, record.kind);

            if path.exists() {
                result.satisfied += 1;
                result.skipped += 1;
                self.reporter
                    .info(format!("Skipping {}, already exists", file_name));
                self.reporter
                    .progress(ordinal, total, format!("Skipped {}", file_name));
                continue;
            }

            self.reporter.info(format!(
                "Saving {} {}/{}: {} from {}",
                kind, ordinal, total, file_name, record.payload_url
            ));
            self.reporter
                .progress(ordinal - 1, total, format!("Saving {}", file_name));

            let part = part_path(&path);
            match bounded(self.fetch_timeout, self.fetch_to_file(record, &part, &path)).await {
                Ok(bytes) => {
                    result.satisfied += 1;
                    result.fetched += 1;
                    debug!("saved {} ({} bytes)", path.display(), bytes);
                    self.reporter
                        .info(format!("Successfully saved {}: {}", kind, file_name));
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&part).await;
                    result.failed.push(ordinal);
                    let err = HarvestError::Transport {
                        ordinal,
                        reason: format!("{:#}", e),
                    };
                    self.reporter.warn(format!(
                        "Failed to save {} {}/{}: {}",
                        kind, ordinal, total, err
                    ));
                }
            }
            self.reporter
                .progress(ordinal, total, format!("Processed {}", file_name));

            if ordinal < total {
                tokio::select! {
                    _ = sleep(self.pacing) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        self.reporter.info(format!(
            "Download completed: {}/{} media items saved",
            result.satisfied, total
        ));
        self.reporter.progress(total, total, "Download completed");
        result
    }

    /// Stream the payload into `part`, then rename it to `final_path`.
    async fn fetch_to_file(
        &self,
        record: &MediaRecord,
        part: &Path,
        final_path: &Path,
    ) -> Result<u64> {
        let resp = self.fetcher.get(&record.payload_url).await?;
        if !resp.is_success() {
            bail!("HTTP {}", resp.status);
        }

        let mut file = tokio::fs::File::create(part).await?;
        let mut body = resp.body;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(part, final_path).await?;
        Ok(written)
    }
}
