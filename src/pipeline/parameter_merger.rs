//! Global and per-step parameter merging

use crate::models::WorkloadParameters;

/// Shallow merge where `local` wins on key conflicts.
///
/// Returns `None` when neither side contributes anything.
pub fn merge(
    global: Option<&WorkloadParameters>,
    local: Option<&WorkloadParameters>,
) -> Option<WorkloadParameters> {
    let global_empty = global.is_none_or(|p| p.is_empty());
    let local_empty = local.is_none_or(|p| p.is_empty());
    if global_empty && local_empty {
        return None;
    }

    let mut merged = global.cloned().unwrap_or_default();
    if let Some(local) = local {
        merged.extend(local.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn params(value: Value) -> WorkloadParameters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_local_overrides_global() {
        let global = params(json!({"a": 1, "b": 2}));
        let local = params(json!({"b": 3, "c": 4}));

        assert_eq!(
            merge(Some(&global), Some(&local)),
            Some(params(json!({"a": 1, "b": 3, "c": 4})))
        );
    }

    #[test]
    fn test_absent_or_empty_is_none() {
        let empty = WorkloadParameters::new();
        assert_eq!(merge(None, None), None);
        assert_eq!(merge(Some(&empty), None), None);
        assert_eq!(merge(None, Some(&empty)), None);
        assert_eq!(merge(Some(&empty), Some(&empty)), None);
    }

    #[test]
    fn test_one_side_only() {
        let only = params(json!({"region": "eu"}));
        assert_eq!(merge(Some(&only), None), Some(only.clone()));
        assert_eq!(merge(None, Some(&only)), Some(only));
    }

    #[test]
    fn test_nested_values_are_replaced_not_merged() {
        let global = params(json!({"filter": {"since": "2024-01-01", "limit": 10}}));
        let local = params(json!({"filter": {"limit": 5}}));

        let merged = merge(Some(&global), Some(&local)).unwrap();
        assert_eq!(merged["filter"], json!({"limit": 5}));
    }

    fn arb_params() -> impl Strategy<Value = WorkloadParameters> {
        prop::collection::hash_map("[a-e]", any::<i64>().prop_map(Value::from), 0..5)
    }

    proptest! {
        #[test]
        fn prop_every_key_present_with_local_precedence(
            global in arb_params(),
            local in arb_params(),
        ) {
            match merge(Some(&global), Some(&local)) {
                None => prop_assert!(global.is_empty() && local.is_empty()),
                Some(merged) => {
                    for (key, value) in &local {
                        prop_assert_eq!(merged.get(key), Some(value));
                    }
                    for (key, value) in &global {
                        if !local.contains_key(key) {
                            prop_assert_eq!(merged.get(key), Some(value));
                        }
                    }
                    for key in merged.keys() {
                        prop_assert!(global.contains_key(key) || local.contains_key(key));
                    }
                }
            }
        }

        #[test]
        fn prop_merge_is_deterministic(global in arb_params(), local in arb_params()) {
            prop_assert_eq!(
                merge(Some(&global), Some(&local)),
                merge(Some(&global), Some(&local))
            );
        }
    }
}
