//! Pipeline compilation
//!
//! - `parameter_merger`: global/step parameter precedence
//! - `compiler`: sorted steps to chained substrate jobs
//! - `loader`: pipeline definitions from TOML or JSON files

pub mod compiler;
pub mod loader;
pub mod parameter_merger;

pub use compiler::{ContinueOnErrorPolicy, PipelineCompiler, PipelinePlan, PlannedSubmission};
pub use parameter_merger::merge;
