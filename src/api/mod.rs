// Control surface: album pipelines, the background worker and tracing setup.

pub mod pipeline;
pub mod telemetry;
pub mod worker;

pub use pipeline::{collect, download, sanitize_album_name, Pipeline, PipelineReport};
pub use telemetry::init_tracing;
pub use worker::{HarvestJob, HarvestWorker};
