//! Click ingestion: a bounded buffer fed by redirects and drained into the
//! analytics store in periodic batches.

pub mod pipeline;

pub use pipeline::{ClickPipeline, ClickPipelineConfig};
