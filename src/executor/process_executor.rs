//! Process executor for external workloads
//!
//! Each workload maps to one executable in the configured directory. The child
//! gets its parameters as `WORKLOAD_*` environment variables, its output is read
//! line by line while it runs, and it is killed together with its process group
//! if it outlives the timeout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::environment::parameter_environment;
use super::process_tree;
use crate::config::ExecutorConfig;
use crate::errors::ExecutionError;
use crate::models::{ExecutionResult, WorkloadParameters, WorkloadType, execution::millis};

/// How long to keep reading output after the child is gone. A descendant that
/// left the process group can hold the pipes open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(5);

static EXECUTABLES: LazyLock<HashMap<WorkloadType, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (WorkloadType::InvoiceGeneration, "invoice-generation"),
        (WorkloadType::PaymentReconciliation, "payment-reconciliation"),
        (WorkloadType::CustomerSync, "customer-sync"),
        (WorkloadType::InventoryUpdate, "inventory-update"),
        (WorkloadType::OrderFulfillment, "order-fulfillment"),
        (WorkloadType::ReportGeneration, "report-generation"),
        (WorkloadType::DataExport, "data-export"),
        (WorkloadType::DataImport, "data-import"),
        (WorkloadType::EmailDispatch, "email-dispatch"),
        (WorkloadType::AuditLogArchival, "audit-log-archival"),
        (WorkloadType::CacheWarmup, "cache-warmup"),
        (WorkloadType::IndexRebuild, "index-rebuild"),
        (WorkloadType::DatabaseCleanup, "database-cleanup"),
        (WorkloadType::BackupSnapshot, "backup-snapshot"),
    ])
});

/// Executable name for a workload, without platform suffix
pub fn executable_name(workload: WorkloadType) -> Option<&'static str> {
    EXECUTABLES.get(&workload).copied()
}

/// Executable file name including the platform suffix (`.exe` on Windows)
pub fn executable_file_name(workload: WorkloadType) -> Option<String> {
    executable_name(workload).map(|name| format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

type LineSink = Arc<Mutex<Vec<String>>>;

/// Runs workload executables to completion
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    executables_dir: PathBuf,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(executables_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executables_dir: executables_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.resolved_executables_dir(), config.timeout)
    }

    pub fn executables_dir(&self) -> &Path {
        &self.executables_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Path the workload's executable is expected at. Does not touch the disk.
    pub fn resolve_path(&self, workload: WorkloadType) -> Result<PathBuf, ExecutionError> {
        executable_file_name(workload)
            .map(|file_name| self.executables_dir.join(file_name))
            .ok_or_else(|| ExecutionError::UnsupportedWorkload {
                workload: workload.to_string(),
            })
    }

    /// Same as [`ProcessExecutor::resolve_path`] for a workload given by name
    pub fn resolve_path_by_name(&self, workload: &str) -> Result<PathBuf, ExecutionError> {
        self.resolve_path(WorkloadType::parse(workload)?)
    }

    /// Whether the executable exists; resolution failures count as unavailable
    pub fn is_available(&self, workload: WorkloadType) -> bool {
        self.resolve_path(workload)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Run a workload given by name
    pub async fn execute_by_name(
        &self,
        workload: &str,
        parameters: Option<&WorkloadParameters>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let workload = WorkloadType::parse(workload)
            .inspect_err(|e| rejected(workload, e, started))?;
        self.execute(workload, parameters).await
    }

    /// Run a workload to completion.
    ///
    /// A non-zero exit is returned as [`ExecutionError::NonZeroExit`] carrying the
    /// full result; a timeout kills the process group and returns
    /// [`ExecutionError::ExecutionTimeout`].
    pub async fn execute(
        &self,
        workload: WorkloadType,
        parameters: Option<&WorkloadParameters>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let path = self
            .resolve_path(workload)
            .inspect_err(|e| rejected(workload.as_ref(), e, started))?;

        if !path.exists() {
            let err = ExecutionError::ExecutableNotFound { workload, path };
            rejected(workload.as_ref(), &err, started);
            return Err(err);
        }

        info!(
            "Starting workload {} ({}) with {} parameter(s), timeout {}",
            workload,
            path.display(),
            parameters.map_or(0, HashMap::len),
            humantime::format_duration(self.timeout)
        );

        let mut cmd = Command::new(&path);
        if let Some(dir) = path.parent() {
            cmd.current_dir(dir);
        }
        cmd.envs(parameter_environment(parameters));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        process_tree::isolate_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            self.failure(
                workload,
                format!("Failed to start {}: {e}", path.display()),
                started,
            )
        })?;
        debug!("Workload {} running with PID {:?}", workload, child.id());

        let stdout_lines = LineSink::default();
        let stderr_lines = LineSink::default();
        let stdout_reader = child.stdout.take().map(|stdout| {
            spawn_line_reader(stdout, workload, OutputStream::Stdout, stdout_lines.clone())
        });
        let stderr_reader = child.stderr.take().map(|stderr| {
            spawn_line_reader(stderr, workload, OutputStream::Stderr, stderr_lines.clone())
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                process_tree::kill_process_tree(&mut child, workload).await;
                drain_output(stdout_reader, stderr_reader, workload).await;
                return Err(self.failure(
                    workload,
                    format!("Failed while waiting for process: {e}"),
                    started,
                ));
            }
            Err(_) => {
                let elapsed = started.elapsed();
                process_tree::kill_process_tree(&mut child, workload).await;
                drain_output(stdout_reader, stderr_reader, workload).await;

                error!(
                    "Workload {} exceeded timeout of {} after {}ms, process tree terminated",
                    workload,
                    humantime::format_duration(self.timeout),
                    millis(elapsed)
                );
                let result = ExecutionResult::timed_out(
                    self.timeout,
                    elapsed,
                    take_lines(&stdout_lines),
                    take_lines(&stderr_lines),
                );
                return Err(ExecutionError::ExecutionTimeout {
                    workload,
                    timeout: self.timeout,
                    result: Box::new(result),
                });
            }
        };

        drain_output(stdout_reader, stderr_reader, workload).await;

        let result = ExecutionResult::from_exit(
            status.code(),
            started.elapsed(),
            take_lines(&stdout_lines),
            take_lines(&stderr_lines),
        );

        if result.success {
            info!(
                "Workload {} completed successfully in {}ms ({} stdout / {} stderr lines)",
                workload,
                result.execution_time_ms,
                result.stdout_lines.len(),
                result.stderr_lines.len()
            );
            Ok(result)
        } else {
            error!(
                "Workload {} failed after {}ms: {}",
                workload,
                result.execution_time_ms,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
            Err(ExecutionError::NonZeroExit {
                workload,
                exit_code: result.exit_code,
                result: Box::new(result),
            })
        }
    }

    fn failure(&self, workload: WorkloadType, message: String, started: Instant) -> ExecutionError {
        let elapsed_ms = millis(started.elapsed());
        error!(
            "Workload {} execution failed after {}ms: {}",
            workload, elapsed_ms, message
        );
        ExecutionError::ExecutionFailure {
            workload,
            message,
            elapsed_ms,
        }
    }
}

/// Failures before a child exists
fn rejected(workload: &str, err: &ExecutionError, started: Instant) {
    error!(
        "Workload {} rejected after {}ms: {}",
        workload,
        millis(started.elapsed()),
        err
    );
}

fn spawn_line_reader<R>(
    reader: R,
    workload: WorkloadType,
    stream: OutputStream,
    sink: LineSink,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if line.is_empty() {
                        continue;
                    }

                    match stream {
                        OutputStream::Stdout => info!("[{}] {}", workload, line),
                        OutputStream::Stderr => warn!("[{}] stderr: {}", workload, line),
                    }
                    if let Ok(mut lines) = sink.lock() {
                        lines.push(line.to_string());
                    }
                }
                Err(e) => {
                    warn!("Error reading {:?} of workload {}: {}", stream, workload, e);
                    break;
                }
            }
        }
    })
}

async fn drain_output(
    stdout_reader: Option<JoinHandle<()>>,
    stderr_reader: Option<JoinHandle<()>>,
    workload: WorkloadType,
) {
    futures::future::join(
        join_reader(stdout_reader, workload),
        join_reader(stderr_reader, workload),
    )
    .await;
}

async fn join_reader(reader: Option<JoinHandle<()>>, workload: WorkloadType) {
    let Some(mut reader) = reader else {
        return;
    };

    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut reader).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Output reader for workload {} panicked: {}", workload, e),
        Err(_) => {
            warn!(
                "Output of workload {} still open {}s after exit, abandoning reader",
                workload,
                OUTPUT_DRAIN_GRACE.as_secs()
            );
            reader.abort();
        }
    }
}

fn take_lines(sink: &LineSink) -> Vec<String> {
    sink.lock()
        .map(|mut lines| std::mem::take(&mut *lines))
        .unwrap_or_default()
}
