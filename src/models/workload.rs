//! The closed set of workload kinds

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::ExecutionError;

/// Parameters handed to a workload; values are opaque JSON.
pub type WorkloadParameters = HashMap<String, serde_json::Value>;

/// Known workload kinds. Each variant maps to exactly one executable, see
/// [`crate::executor::executable_name`].
///
/// Names parse ASCII case-insensitively everywhere, including pipeline files and
/// configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(try_from = "String")]
#[strum(ascii_case_insensitive)]
pub enum WorkloadType {
    InvoiceGeneration,
    PaymentReconciliation,
    CustomerSync,
    InventoryUpdate,
    OrderFulfillment,
    ReportGeneration,
    DataExport,
    DataImport,
    EmailDispatch,
    AuditLogArchival,
    CacheWarmup,
    IndexRebuild,
    DatabaseCleanup,
    BackupSnapshot,
}

impl WorkloadType {
    /// Parse a workload name, ignoring case and surrounding whitespace
    pub fn parse(name: &str) -> Result<Self, ExecutionError> {
        Self::from_str(name.trim()).map_err(|_| ExecutionError::UnsupportedWorkload {
            workload: name.to_string(),
        })
    }
}

impl TryFrom<String> for WorkloadType {
    type Error = ExecutionError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::parse(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_fourteen_variants() {
        assert_eq!(WorkloadType::iter().count(), 14);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            WorkloadType::from_str("dataexport").unwrap(),
            WorkloadType::DataExport
        );
        assert_eq!(
            WorkloadType::from_str("DataExport").unwrap(),
            WorkloadType::DataExport
        );
        assert!(WorkloadType::from_str("LaunchRockets").is_err());
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for workload in WorkloadType::iter() {
            assert_eq!(
                WorkloadType::from_str(&workload.to_string()).unwrap(),
                workload
            );
        }
    }

    #[test]
    fn test_deserialize_ignores_case() {
        let workload: WorkloadType = serde_json::from_str(r#""dataexport""#).unwrap();
        assert_eq!(workload, WorkloadType::DataExport);

        let workload: WorkloadType = serde_json::from_str(r#""BACKUPSNAPSHOT""#).unwrap();
        assert_eq!(workload, WorkloadType::BackupSnapshot);
    }

    #[test]
    fn test_deserialize_unknown_name_is_unsupported() {
        let err = serde_json::from_str::<WorkloadType>(r#""LaunchRockets""#).unwrap_err();
        assert!(
            err.to_string()
                .contains("Unsupported workload type: LaunchRockets"),
            "{err}"
        );

        assert!(matches!(
            WorkloadType::try_from("LaunchRockets".to_string()),
            Err(ExecutionError::UnsupportedWorkload { ref workload }) if workload == "LaunchRockets"
        ));
    }

    #[test]
    fn test_serializes_canonical_name() {
        assert_eq!(
            serde_json::to_string(&WorkloadType::parse(" cachewarmup ").unwrap()).unwrap(),
            r#""CacheWarmup""#
        );
    }
}
