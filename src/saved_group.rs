use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Saved groups referenced from rule conditions, keyed by group id.
pub type GroupMap = HashMap<String, SavedGroup>;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SavedGroup {
    #[serde(default)]
    pub values: Vec<Value>,
}

/// Rewrite `$inGroup` / `$notInGroup` references into plain `$in` / `$nin` lists so that SDKs
/// never need the group definitions. Unknown groups expand to an empty list.
pub fn expand_saved_groups(condition: &Value, groups: &GroupMap) -> Value {
    match condition {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| match (key.as_str(), value) {
                    ("$inGroup", Value::String(group_id)) => {
                        ("$in".to_owned(), group_values(group_id, groups))
                    }
                    ("$notInGroup", Value::String(group_id)) => {
                        ("$nin".to_owned(), group_values(group_id, groups))
                    }
                    _ => (key.clone(), expand_saved_groups(value, groups)),
                })
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| expand_saved_groups(item, groups))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn group_values(group_id: &str, groups: &GroupMap) -> Value {
    Value::Array(
        groups
            .get(group_id)
            .map(|group| group.values.clone())
            .unwrap_or_default(),
    )
}
