use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::rule::FeatureRule;
use crate::value::ValueType;

/// A feature definition as persisted by the feature store.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub default_value: String,
    #[serde(default)]
    pub value_type: ValueType,
    /// Features that must serve a matching value for this feature to be served at all.
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub environment_settings: HashMap<String, EnvironmentSettings>,
}

/// A reference to a parent feature plus a JSON-encoded condition over `{ "value": <parent's
/// served value> }`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Prerequisite {
    pub id: String,
    #[serde(default)]
    pub condition: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EnvironmentSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FeatureRule>,
}

impl Feature {
    /// Settings for `environment`, if the feature is switched on there.
    pub fn enabled_settings(&self, environment: &str) -> Option<&EnvironmentSettings> {
        self.environment_settings
            .get(environment)
            .filter(|settings| settings.enabled)
    }

    /// Parse one of this feature's stored values according to its value type.
    pub fn typed_value(&self, raw: &str) -> Value {
        self.value_type.parse(raw)
    }
}
