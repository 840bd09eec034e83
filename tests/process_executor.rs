#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::TempDir;
use workload_orchestrator::errors::ExecutionError;
use workload_orchestrator::executor::ProcessExecutor;
use workload_orchestrator::models::WorkloadType;

use common::{install_script, params};

fn executor(dir: &TempDir, timeout: Duration) -> ProcessExecutor {
    ProcessExecutor::new(dir.path(), timeout)
}

/// Gone, or killed and waiting to be reaped
fn process_gone(pid: i32) -> bool {
    if unsafe { libc::kill(pid, 0) } != 0 {
        return true;
    }
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .map(|stat| {
            stat.rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[tokio::test]
async fn test_successful_run_captures_output_in_order() {
    let dir = TempDir::new().unwrap();
    install_script(
        dir.path(),
        WorkloadType::ReportGeneration,
        "echo first\necho\necho second\necho warning >&2\necho third",
    );

    let result = executor(&dir, Duration::from_secs(10))
        .execute(WorkloadType::ReportGeneration, None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout_lines, vec!["first", "second", "third"]);
    assert_eq!(result.stderr_lines, vec!["warning"]);
    assert_eq!(result.error_message, None);
}

#[tokio::test]
async fn test_parameters_arrive_as_environment() {
    let dir = TempDir::new().unwrap();
    install_script(
        dir.path(),
        WorkloadType::DataExport,
        "echo \"region=$WORKLOAD_REGION\"\n\
         echo \"batch=$WORKLOAD_BATCH_SIZE\"\n\
         echo \"note=[$WORKLOAD_NOTE]\"",
    );
    let parameters = params(json!({"region": "eu", "batch_size": 500, "note": null}));

    let result = executor(&dir, Duration::from_secs(10))
        .execute(WorkloadType::DataExport, Some(&parameters))
        .await
        .unwrap();

    assert_eq!(result.stdout_lines, vec!["region=eu", "batch=500", "note=[]"]);
    assert!(std::env::var("WORKLOAD_REGION").is_err());
}

#[tokio::test]
async fn test_runs_in_executable_directory() {
    let dir = TempDir::new().unwrap();
    install_script(dir.path(), WorkloadType::CacheWarmup, "pwd -P");

    let result = executor(&dir, Duration::from_secs(10))
        .execute(WorkloadType::CacheWarmup, None)
        .await
        .unwrap();

    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(result.stdout_lines, vec![expected.display().to_string()]);
}

#[tokio::test]
async fn test_non_zero_exit_carries_result() {
    let dir = TempDir::new().unwrap();
    install_script(
        dir.path(),
        WorkloadType::PaymentReconciliation,
        "echo partial\necho 'ledger locked' >&2\nexit 3",
    );

    let err = executor(&dir, Duration::from_secs(10))
        .execute(WorkloadType::PaymentReconciliation, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::NonZeroExit { exit_code: Some(3), .. }));
    let result = err.into_result().unwrap();
    assert!(!result.success);
    assert_eq!(result.stdout_lines, vec!["partial"]);
    let message = result.error_message.unwrap();
    assert!(message.contains("code 3"), "{message}");
    assert!(message.contains("ledger locked"), "{message}");
}

#[tokio::test]
async fn test_execute_by_name() {
    let dir = TempDir::new().unwrap();
    install_script(dir.path(), WorkloadType::IndexRebuild, "echo rebuilt");

    let result = executor(&dir, Duration::from_secs(10))
        .execute_by_name("indexrebuild", None)
        .await
        .unwrap();
    assert_eq!(result.stdout_lines, vec!["rebuilt"]);
}

#[tokio::test]
async fn test_timeout_kills_process_tree() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    install_script(
        dir.path(),
        WorkloadType::BackupSnapshot,
        "sleep 30 &\necho $! > \"$WORKLOAD_PID_FILE\"\necho started\nwait",
    );
    let parameters = params(json!({"pid_file": pid_file.display().to_string()}));
    let timeout = Duration::from_millis(500);

    let started = Instant::now();
    let err = executor(&dir, timeout)
        .execute(WorkloadType::BackupSnapshot, Some(&parameters))
        .await
        .unwrap_err();
    let wall = started.elapsed();

    let ExecutionError::ExecutionTimeout { timeout: reported, result, .. } = err else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(reported, timeout);
    assert!(!result.success);
    assert_eq!(result.exit_code, None);
    assert!(result.execution_time_ms >= 500);
    assert!(result.execution_time_ms < 5_000);
    assert!(wall < Duration::from_secs(5), "kill took {wall:?}");
    assert_eq!(result.stdout_lines, vec!["started"]);
    assert!(result.error_message.unwrap().contains("timeout"));

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while !process_gone(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(process_gone(pid), "grandchild {pid} survived the timeout");
}
