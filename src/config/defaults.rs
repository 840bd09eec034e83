/// Configuration default values
///
/// Every default lives here so it can be changed in one place.
// Executor defaults
pub const DEFAULT_EXECUTABLES_DIR: &str = "Executables";
pub const DEFAULT_EXECUTION_TIMEOUT: &str = "60m";
/// Prefix of the environment variables a workload receives its parameters in
pub const WORKLOAD_ENV_PREFIX: &str = "WORKLOAD_";

// Runner defaults
pub const DEFAULT_POLL_INTERVAL: &str = "1s";
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
pub const DEFAULT_SHUTDOWN_GRACE: &str = "30s";
/// How long finished jobs stay queryable
pub const DEFAULT_JOB_RETENTION: &str = "24h";

// Loading
pub const DEFAULT_CONFIG_FILE: &str = "orchestrator.toml";
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
pub const ENV_PREFIX: &str = "ORCHESTRATOR_";
