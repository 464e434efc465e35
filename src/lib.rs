// Library exports for testing and reuse

pub mod chunking;
pub mod cli;
pub mod cog;
pub mod combine;
pub mod config;
pub mod crs;
pub mod distance;
pub mod element;
pub mod error;
pub mod fill;
pub mod io;
pub mod morphology;
pub mod pipeline;

// Re-export commonly used types
pub use combine::CellSource;
pub use config::{BlendConfig, Version};
pub use element::StructuringElement;
pub use error::{BendingError, Result};
pub use io::{GdalSink, GdalSource, RasterMetadata};
pub use pipeline::{blend_arrays, run_blocks, BendingPlan, BlockSink, BlockSource, RunSummary};
