#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use workload_orchestrator::executor::executable_file_name;
use workload_orchestrator::models::{WorkloadParameters, WorkloadType};

/// Install a `/bin/sh` script as the executable for `workload`
pub fn install_script(dir: &Path, workload: WorkloadType, body: &str) -> PathBuf {
    let path = dir.join(executable_file_name(workload).unwrap());
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn params(value: serde_json::Value) -> WorkloadParameters {
    serde_json::from_value(value).unwrap()
}

/// Lines appended to `run.log` by the scripts, in order
pub fn run_log(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("run.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
