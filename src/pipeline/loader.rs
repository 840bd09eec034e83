//! Reading pipeline definitions from disk

use std::path::Path;

use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::WorkflowPipelineRequest;

/// Load a pipeline from a `.json` file, or TOML for any other extension
pub async fn load_request(path: impl AsRef<Path>) -> AppResult<WorkflowPipelineRequest> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::configuration(format!("Failed to read pipeline file {}: {e}", path.display()))
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    debug!(
        "Parsing pipeline file {} as {}",
        path.display(),
        if is_json { "JSON" } else { "TOML" }
    );

    let request: WorkflowPipelineRequest = if is_json {
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    } else {
        toml::from_str(&contents).map_err(|e| e.to_string())
    }
    .map_err(|e| {
        AppError::configuration(format!("Invalid pipeline file {}: {e}", path.display()))
    })?;

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkloadType;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_toml_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightly.toml");
        std::fs::write(
            &path,
            r#"
pipeline_name = "nightly"

[global_parameters]
region = "eu"

[[steps]]
workload_type = "DataExport"
order = 1
delay_after_completion = "2m"

[[steps]]
workload_type = "EmailDispatch"
order = 2
continue_on_error = true
"#,
        )
        .unwrap();

        let request = load_request(&path).await.unwrap();
        assert_eq!(request.pipeline_name, "nightly");
        assert_eq!(request.steps.len(), 2);
        assert_eq!(request.steps[0].delay_after_completion, Some(Duration::from_secs(120)));
        assert!(request.steps[1].continue_on_error);
        assert_eq!(request.steps[1].workload_type, WorkloadType::EmailDispatch);
    }

    #[tokio::test]
    async fn test_load_json_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        std::fs::write(
            &path,
            r#"{
                "pipeline_name": "sync",
                "steps": [
                    {"workload_type": "CustomerSync", "order": 1, "delay_after_completion": 30}
                ]
            }"#,
        )
        .unwrap();

        let request = load_request(&path).await.unwrap();
        assert_eq!(request.steps[0].delay_after_completion, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_request(dir.path().join("absent.toml")).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_request(&path).await.unwrap_err();
        assert!(err.to_string().contains("Invalid pipeline file"));
    }

    #[tokio::test]
    async fn test_workload_names_ignore_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lower.toml");
        std::fs::write(
            &path,
            r#"
pipeline_name = "lower"

[[steps]]
workload_type = "dataexport"
order = 1

[[steps]]
workload_type = "EMAILDISPATCH"
order = 2
"#,
        )
        .unwrap();

        let request = load_request(&path).await.unwrap();
        assert_eq!(request.steps[0].workload_type, WorkloadType::DataExport);
        assert_eq!(request.steps[1].workload_type, WorkloadType::EmailDispatch);
    }

    #[tokio::test]
    async fn test_unknown_workload_name_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rockets.json");
        std::fs::write(
            &path,
            r#"{"pipeline_name": "x", "steps": [{"workload_type": "LaunchRockets"}]}"#,
        )
        .unwrap();

        let err = load_request(&path).await.unwrap_err();
        assert!(
            err.to_string()
                .contains("Unsupported workload type: LaunchRockets"),
            "{err}"
        );
    }
}
