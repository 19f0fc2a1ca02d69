// Background worker: runs one pipeline job off the caller's task.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::pipeline::{Pipeline, PipelineReport};
use crate::error::{HarvestError, HarvestResult};

#[derive(Debug, Clone)]
pub enum HarvestJob {
    /// Collect then download into `<root>/<album title>`.
    Scrape {
        album_url: String,
        root: PathBuf,
        item_cap: usize,
    },
    GrabLinks {
        album_url: String,
        root: PathBuf,
        album_title: String,
        item_cap: usize,
    },
    ResumeGrab {
        album_url: String,
        checkpoint: PathBuf,
        item_cap: usize,
    },
    Download {
        checkpoint: PathBuf,
        root: PathBuf,
        item_cap: usize,
    },
}

impl HarvestJob {
    fn name(&self) -> &'static str {
        match self {
            HarvestJob::Scrape { .. } => "scrape",
            HarvestJob::GrabLinks { .. } => "grab_links",
            HarvestJob::ResumeGrab { .. } => "resume_grab",
            HarvestJob::Download { .. } => "download",
        }
    }
}

pub struct HarvestWorker {
    cancel: CancellationToken,
    handle: JoinHandle<HarvestResult<PipelineReport>>,
}

impl HarvestWorker {
    /// Start `job` on the runtime. Must be called from within a tokio runtime.
    pub fn spawn(pipeline: Arc<Pipeline>, job: HarvestJob) -> Self {
        let cancel = pipeline.cancel_token();
        let handle = tokio::spawn(async move {
            let name = job.name();
            info!("worker started: job={}", name);
            let result = run_job(&pipeline, job).await;
            match &result {
                Ok(report) => info!(
                    "worker finished: job={} album_dir={}",
                    name,
                    report.album_dir.display()
                ),
                Err(e) => warn!("worker failed: job={} error={}", name, e),
            }
            result
        });
        Self { cancel, handle }
    }

    /// Request a cooperative stop; the job winds down at its next step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> HarvestResult<PipelineReport> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(HarvestError::Cancelled),
            Err(e) => Err(anyhow!("worker task panicked: {}", e).into()),
        }
    }
}

async fn run_job(pipeline: &Pipeline, job: HarvestJob) -> HarvestResult<PipelineReport> {
    match job {
        HarvestJob::Scrape {
            album_url,
            root,
            item_cap,
        } => pipeline.scrape_album(&album_url, &root, item_cap).await,
        HarvestJob::GrabLinks {
            album_url,
            root,
            album_title,
            item_cap,
        } => {
            pipeline
                .grab_links(&album_url, &root, &album_title, item_cap)
                .await
        }
        HarvestJob::ResumeGrab {
            album_url,
            checkpoint,
            item_cap,
        } => {
            pipeline
                .resume_grab_links(&album_url, &checkpoint, item_cap)
                .await
        }
        HarvestJob::Download {
            checkpoint,
            root,
            item_cap,
        } => {
            pipeline
                .download_from_checkpoint(&checkpoint, &root, item_cap)
                .await
        }
    }
}
