use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::error::Error;
use crate::experiment::ExperimentMap;
use crate::feature::Feature;
use crate::prerequisite::PrerequisiteResolver;
use crate::saved_group::GroupMap;
use crate::store::FeatureIndex;
use crate::util::is_false;

/// The features served to SDKs in one environment, keyed by feature id.
///
/// Blocked features are absent rather than present with some "off" marker. The map is sorted so
/// that the same input always serializes to the same bytes.
pub type Payload = BTreeMap<String, PayloadEntry>;

/// The SDK-facing definition of one feature.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadEntry {
    pub default_value: Value,
    /// Omitted entirely, not serialized as `[]`, when there is nothing to evaluate.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PayloadRule>,
}

/// A minimized rule as SDKs consume it.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRule {
    pub id: Option<String>,
    pub condition: Option<Value>,
    /// Prerequisites SDKs have to re-check at evaluation time.
    pub parent_conditions: Option<Vec<ParentCondition>>,
    pub force: Option<Value>,
    pub coverage: Option<f64>,
    pub hash_attribute: Option<String>,
    pub key: Option<String>,
    pub variations: Option<Vec<Value>>,
    pub weights: Option<Vec<f64>>,
    pub namespace: Option<(String, f64, f64)>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParentCondition {
    pub id: String,
    pub condition: Value,
    /// Set on feature-level prerequisites: when the parent fails, the whole feature evaluates
    /// to null instead of falling through to the next rule.
    #[serde(skip_serializing_if = "is_false")]
    pub gate: bool,
}

impl PayloadRule {
    /// The leading rule that carries a feature's own unresolved prerequisites.
    pub fn gate(parent_conditions: Vec<ParentCondition>) -> Self {
        PayloadRule {
            parent_conditions: Some(parent_conditions),
            ..Default::default()
        }
    }

    /// Every value this rule can serve.
    pub fn served_values(&self) -> impl Iterator<Item = &Value> {
        self.force
            .iter()
            .chain(self.variations.iter().flatten())
    }

    /// A forced value with nothing that could make the rule be skipped.
    pub fn applies_to_everyone(&self) -> bool {
        self.force.is_some()
            && self.condition.is_none()
            && self.parent_conditions.is_none()
            && self.coverage.is_none()
    }
}

/// Everything a payload is generated from.
#[derive(Clone, Copy, Debug)]
pub struct PayloadRequest<'a> {
    /// The features to consider. Callers filter by project or archived status beforehand.
    pub features: &'a [Feature],
    pub environment: &'a str,
    pub group_map: Option<&'a GroupMap>,
    pub experiment_map: Option<&'a ExperimentMap>,
    /// The instant rule schedules are evaluated at.
    pub date: DateTime<Utc>,
}

impl<'a> PayloadRequest<'a> {
    /// A request evaluated at the current time, without saved groups or experiments.
    pub fn new(features: &'a [Feature], environment: &'a str) -> Self {
        PayloadRequest {
            features,
            environment,
            group_map: None,
            experiment_map: None,
            date: Utc::now(),
        }
    }

    pub fn group_map(mut self, group_map: &'a GroupMap) -> Self {
        self.group_map = Some(group_map);
        self
    }

    pub fn experiment_map(mut self, experiment_map: &'a ExperimentMap) -> Self {
        self.experiment_map = Some(experiment_map);
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }
}

/// Build the SDK payload for one environment.
///
/// Every feature whose own prerequisites can never be satisfied is left out. The others are
/// emitted with their typed default value and their rules, in order, with prerequisites that
/// are already decided stripped and the undecided ones compiled into `parentConditions`.
///
/// Fails if the prerequisite graph contains a cycle reachable from an enabled feature.
pub fn generate_features_payload(request: &PayloadRequest<'_>) -> Result<Payload, Error> {
    let store = FeatureIndex::new(request.features);
    let mut resolver = PrerequisiteResolver::new(&store, request.environment, request.date);
    if let Some(group_map) = request.group_map {
        resolver = resolver.with_group_map(group_map);
    }
    if let Some(experiment_map) = request.experiment_map {
        resolver = resolver.with_experiment_map(experiment_map);
    }

    let mut payload = Payload::new();
    for feature in request.features {
        if payload.contains_key(&feature.id) {
            continue;
        }
        if let Some(entry) = resolver.payload_entry(&feature.id)? {
            payload.insert(feature.id.clone(), entry);
        }
    }
    Ok(payload)
}
