// Collection store: ordered, deduplicated records checkpointed after every append.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

use super::record::MediaRecord;
use crate::error::HarvestError;

#[derive(Debug)]
pub enum AppendOutcome {
    Appended,
    /// The canonical URL was already stored; nothing changed.
    Duplicate,
    /// Kept in memory, but the checkpoint write failed.
    AppendedUnsaved(HarvestError),
}

pub struct CollectionStore {
    records: Vec<MediaRecord>,
    seen: HashSet<String>,
    checkpoint: Option<PathBuf>,
}

impl CollectionStore {
    /// A store without a checkpoint; appends are never persisted.
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            seen: HashSet::new(),
            checkpoint: None,
        }
    }

    /// Open a store backed by `checkpoint`, seeding it with any persisted records.
    pub fn open(checkpoint: &Path) -> Result<Self> {
        let records = Self::load(checkpoint)?;
        let seen = records.iter().map(|r| r.canonical_url.clone()).collect();
        Ok(Self {
            records,
            seen,
            checkpoint: Some(checkpoint.to_path_buf()),
        })
    }

    /// Read a checkpoint. A missing file is an empty sequence.
    pub fn load(checkpoint: &Path) -> Result<Vec<MediaRecord>> {
        if !checkpoint.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(checkpoint)
            .with_context(|| format!("reading checkpoint {}", checkpoint.display()))?;
        let records: Vec<MediaRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing checkpoint {}", checkpoint.display()))?;
        debug!("loaded {} records from {}", records.len(), checkpoint.display());
        Ok(records)
    }

    /// Append unless the canonical URL is known, then rewrite the checkpoint.
    pub fn append(&mut self, record: MediaRecord) -> AppendOutcome {
        if self.seen.contains(&record.canonical_url) {
            return AppendOutcome::Duplicate;
        }
        self.seen.insert(record.canonical_url.clone());
        self.records.push(record);

        match self.persist() {
            Ok(()) => AppendOutcome::Appended,
            Err(e) => AppendOutcome::AppendedUnsaved(HarvestError::Persistence(format!("{:#}", e))),
        }
    }

    /// Atomically replace the checkpoint with the current sequence.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.checkpoint else {
            return Ok(());
        };
        write_checkpoint(path, &self.records)
    }

    pub fn contains(&self, canonical_url: &str) -> bool {
        self.seen.contains(canonical_url)
    }

    pub fn records(&self) -> &[MediaRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&MediaRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    pub fn into_records(self) -> Vec<MediaRecord> {
        self.records
    }
}

/// Write to a sibling temp file and rename it over `path`, so readers only
/// ever see a complete checkpoint.
fn write_checkpoint(path: &Path, records: &[MediaRecord]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let payload = serde_json::to_vec(records)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&payload)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("replacing checkpoint {}", path.display()))?;

    debug!("checkpoint {} records -> {}", records.len(), path.display());
    Ok(())
}
