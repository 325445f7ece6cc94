//! Configuration module for the pipeline monitor.

// Can all be private now because we have a public re-export.
mod backend;
mod debug;

// Can't be private because the field-name tables are addressed by path
pub mod pipeline;

// Re-export commonly used items
pub use backend::{BACKEND, BackendApiConfig};
pub use debug::{DF, LOG_PERFORMANCE};
pub use pipeline::{PIPELINE_STAGES, StageDef, SubStageDef};
