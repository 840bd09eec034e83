pub mod config;
pub mod errors;
pub mod executor;
pub mod job_scheduling;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use config::Config;
pub use errors::{AppError, AppResult};
