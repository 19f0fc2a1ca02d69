pub mod api;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod locate;

pub use api::{init_tracing, HarvestJob, HarvestWorker, Pipeline, PipelineReport};
pub use config::{EngineConfig, SpeedPreset};
pub use engine::downloader::{DownloadManager, DownloadResult};
pub use engine::progress::{ChannelSink, HarvestEvent, LogLevel, NullSink, ProgressSink, Reporter};
pub use engine::record::{MediaKind, MediaRecord};
pub use engine::store::CollectionStore;
pub use engine::traversal::{
    CollectionResult, TraversalEngine, TraversalOutcome, TraversalRequest,
};
pub use error::{HarvestError, HarvestResult};
