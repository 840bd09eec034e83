//! Parameter to environment variable projection

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::config::defaults::WORKLOAD_ENV_PREFIX;
use crate::models::WorkloadParameters;

/// `region` -> `WORKLOAD_REGION`
pub fn env_var_name(key: &str) -> String {
    format!("{WORKLOAD_ENV_PREFIX}{}", key.to_uppercase())
}

/// Strings pass through unquoted, null becomes empty, everything else is JSON text
pub fn env_var_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The variables a workload receives, sorted by name.
///
/// Keys that collide once uppercased (`region`, `REGION`) resolve by key order:
/// the key that sorts last wins.
pub fn parameter_environment(parameters: Option<&WorkloadParameters>) -> BTreeMap<String, String> {
    let mut entries: Vec<_> = parameters.into_iter().flatten().collect();
    entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

    let mut env = BTreeMap::new();
    for (key, value) in entries {
        let name = env_var_name(key);
        if env.insert(name.clone(), env_var_value(value)).is_some() {
            warn!("Parameter '{}' overrides an earlier parameter mapped to {}", key, name);
        }
    }
    env
}
