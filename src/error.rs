use thiserror::Error;

/// Result type used by the control operations.
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Failure taxonomy of a harvest run.
///
/// Only `BlockedLocation` and `StallExhaustion` end a run. The other variants
/// describe per-step conditions that are logged while the run continues.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("no media found on the current page")]
    LocatorMiss,

    #[error("blocked at authentication or verification page: {location}")]
    BlockedLocation { location: String },

    #[error("traversal stalled: {failed_recoveries} consecutive recoveries failed to advance")]
    StallExhaustion { failed_recoveries: u32 },

    #[error("transfer of item {ordinal} failed: {reason}")]
    Transport { ordinal: usize, reason: String },

    #[error("checkpoint write failed: {0}")]
    Persistence(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    /// Whether this condition terminates the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::BlockedLocation { .. } | HarvestError::StallExhaustion { .. }
        )
    }
}
