//! External workload execution
//!
//! - `ProcessExecutor`: resolves a workload to its executable and runs it
//! - `environment`: projects parameters onto `WORKLOAD_*` variables
//! - `process_tree`: process-group isolation and kill-on-timeout

pub mod environment;
pub mod process_executor;
pub mod process_tree;

pub use process_executor::{ProcessExecutor, executable_file_name, executable_name};
