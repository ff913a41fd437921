#![cfg(test)]

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::feature::Feature;
use crate::store::Store;

pub fn fixed_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub struct TestStore {
    features: Vec<Feature>,
    index: HashMap<String, usize>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::new_from_json_str(
            r#"[
                {"id": "parentOn", "defaultValue": "true",
                 "environmentSettings": {"production": {"enabled": true}}},
                {"id": "parentOff", "defaultValue": "false",
                 "environmentSettings": {"production": {"enabled": true}}},
                {"id": "parentDisabled", "defaultValue": "true",
                 "environmentSettings": {"production": {"enabled": false}}},
                {"id": "parentTargeted", "defaultValue": "false",
                 "environmentSettings": {"production": {"enabled": true, "rules": [
                    {"type": "force", "id": "us", "value": "true", "condition": "{\"country\": \"US\"}"}
                 ]}}},
                {"id": "parentForcedOn", "defaultValue": "false",
                 "environmentSettings": {"production": {"enabled": true, "rules": [
                    {"type": "force", "id": "everyone", "value": "true"}
                 ]}}},
                {"id": "parentRollout", "defaultValue": "false",
                 "environmentSettings": {"production": {"enabled": true, "rules": [
                    {"type": "rollout", "id": "half", "value": "true", "coverage": 0.5}
                 ]}}},
                {"id": "parentWithBlockedRule", "defaultValue": "false",
                 "environmentSettings": {"production": {"enabled": true, "rules": [
                    {"type": "force", "id": "blocked", "value": "true",
                     "prerequisites": [{"id": "parentDisabled", "condition": "{}"}]}
                 ]}}},
                {"id": "chainedToDisabled", "defaultValue": "true",
                 "prerequisites": [{"id": "parentDisabled", "condition": "{\"value\": true}"}],
                 "environmentSettings": {"production": {"enabled": true}}},
                {"id": "chainedToOn", "defaultValue": "true",
                 "prerequisites": [{"id": "parentOn", "condition": "{\"value\": true}"}],
                 "environmentSettings": {"production": {"enabled": true}}},
                {"id": "chainedToTargeted", "defaultValue": "true",
                 "prerequisites": [{"id": "parentTargeted", "condition": "{\"value\": true}"}],
                 "environmentSettings": {"production": {"enabled": true}}},
                {"id": "diamondLeft", "defaultValue": "true",
                 "prerequisites": [{"id": "parentOn", "condition": "{\"value\": true}"}],
                 "environmentSettings": {"production": {"enabled": true}}},
                {"id": "diamondRight", "defaultValue": "true",
                 "prerequisites": [{"id": "parentOn", "condition": "{\"value\": true}"}],
                 "environmentSettings": {"production": {"enabled": true}}},
                {"id": "diamondTop", "defaultValue": "true",
                 "prerequisites": [
                    {"id": "diamondLeft", "condition": "{\"value\": true}"},
                    {"id": "diamondRight", "condition": "{\"value\": true}"}
                 ],
                 "environmentSettings": {"production": {"enabled": true}}}
            ]"#,
        )
    }

    pub fn new_from_json_str(json: &str) -> Self {
        let features: Vec<Feature> = serde_json::from_str(json).unwrap();
        let mut index = HashMap::new();
        for (i, feature) in features.iter().enumerate() {
            index.entry(feature.id.clone()).or_insert(i);
        }
        Self { features, index }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn date(&self) -> DateTime<Utc> {
        fixed_date()
    }
}

impl Store for TestStore {
    fn feature(&self, feature_id: &str) -> Option<&Feature> {
        self.index.get(feature_id).map(|i| &self.features[*i])
    }
}
