//! Domain models shared by the executor, the pipeline compiler and the job substrate

pub mod execution;
pub mod identifiers;
pub mod request;
pub mod workload;

pub use execution::*;
pub use identifiers::*;
pub use request::*;
pub use workload::*;
