use log::{debug, warn};
use serde_json::Value;

use crate::condition::Condition;
use crate::error::Error;
use crate::experiment::{Experiment, ExperimentStatus};
use crate::feature::Feature;
use crate::payload::PayloadRule;
use crate::prerequisite::{GateOutcome, PrerequisiteResolver};
use crate::rule::{ExperimentRefVariation, FeatureRule, RuleKind};
use crate::saved_group::expand_saved_groups;

impl<'a> PrerequisiteResolver<'a> {
    /// Compile one stored rule into its payload form, or None if SDKs will never apply it.
    ///
    /// A rule is dropped when it is switched off at the resolver's date, when one of its
    /// prerequisites is off, when its condition is malformed, or when the experiment it refers
    /// to is not serving. Prerequisites that are live are removed from the rule; conditional ones
    /// become its `parentConditions`.
    pub fn compile_rule(
        &mut self,
        rule: &FeatureRule,
        feature: &Feature,
    ) -> Result<Option<PayloadRule>, Error> {
        if !rule.is_active_at(self.date) {
            debug!("rule {} of feature {} is not active", rule.id, feature.id);
            return Ok(None);
        }

        let parent_conditions = match self.resolve_prerequisites(&rule.prerequisites, false)? {
            GateOutcome::Blocked { prerequisite_id } => {
                debug!(
                    "rule {} of feature {} is blocked by prerequisite {}",
                    rule.id, feature.id, prerequisite_id
                );
                return Ok(None);
            }
            GateOutcome::Open => None,
            GateOutcome::Gated(parent_conditions) => Some(parent_conditions),
        };

        let (mut compiled, condition) = match self.compile_kind(rule, feature) {
            Some(compiled) => compiled,
            None => return Ok(None),
        };
        compiled.condition = match self.condition_value(condition) {
            Ok(condition) => condition,
            Err(e) => {
                warn!(
                    "dropping rule {} of feature {} with malformed condition: {}",
                    rule.id, feature.id, e
                );
                return Ok(None);
            }
        };
        compiled.id = Some(rule.id.clone()).filter(|id| !id.is_empty());
        compiled.parent_conditions = parent_conditions;
        Ok(Some(compiled))
    }

    // The rule body, plus the source of the condition it is targeted by.
    fn compile_kind<'r>(
        &self,
        rule: &'r FeatureRule,
        feature: &Feature,
    ) -> Option<(PayloadRule, &'r str)>
    where
        'a: 'r,
    {
        let compiled = match &rule.kind {
            RuleKind::Force { value } => PayloadRule {
                force: Some(feature.typed_value(value)),
                ..Default::default()
            },
            RuleKind::Rollout {
                value,
                coverage,
                hash_attribute,
            } => PayloadRule {
                force: Some(feature.typed_value(value)),
                coverage: Some(*coverage),
                hash_attribute: Some(hash_attribute.clone()),
                ..Default::default()
            },
            RuleKind::Experiment {
                tracking_key,
                hash_attribute,
                coverage,
                values,
                namespace,
            } => PayloadRule {
                key: Some(if tracking_key.is_empty() {
                    feature.id.clone()
                } else {
                    tracking_key.clone()
                }),
                variations: Some(values.iter().map(|v| feature.typed_value(&v.value)).collect()),
                weights: Some(values.iter().map(|v| v.weight).collect()),
                coverage: Some(*coverage),
                hash_attribute: Some(hash_attribute.clone()),
                namespace: namespace.as_ref().and_then(|n| n.as_payload()),
                ..Default::default()
            },
            RuleKind::ExperimentRef {
                experiment_id,
                variations,
            } => {
                let experiment = match self.experiment_map.and_then(|m| m.get(experiment_id)) {
                    Some(experiment) => experiment,
                    None => {
                        warn!(
                            "rule {} of feature {} refers to unknown experiment {}",
                            rule.id, feature.id, experiment_id
                        );
                        return None;
                    }
                };
                return compile_experiment_ref(rule, feature, experiment, variations);
            }
        };
        Some((compiled, rule.condition.as_str()))
    }

    // Parse, expand saved groups and validate a rule condition. An empty condition is None.
    fn condition_value(&self, raw: &str) -> Result<Option<Value>, String> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let mut value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if let Some(group_map) = self.group_map {
            value = expand_saved_groups(&value, group_map);
        }
        if Condition::from_value(&value).is_malformed() {
            return Err(raw.to_owned());
        }
        Ok(match &value {
            Value::Object(map) if map.is_empty() => None,
            _ => Some(value),
        })
    }
}

fn compile_experiment_ref<'r>(
    rule: &'r FeatureRule,
    feature: &Feature,
    experiment: &'r Experiment,
    variations: &[ExperimentRefVariation],
) -> Option<(PayloadRule, &'r str)> {
    if experiment.archived {
        return None;
    }
    let value_of = |variation_id: &str| {
        variations
            .iter()
            .find(|v| v.variation_id == variation_id)
            .map(|v| feature.typed_value(&v.value))
    };

    match experiment.status {
        ExperimentStatus::Draft => None,
        ExperimentStatus::Stopped => {
            let released = experiment.released_variation_id.as_deref()?;
            let force = value_of(released)?;
            Some((
                PayloadRule {
                    force: Some(force),
                    ..Default::default()
                },
                rule.condition.as_str(),
            ))
        }
        ExperimentStatus::Running => {
            let phase = experiment.current_phase()?;
            let values = experiment
                .variations
                .iter()
                .map(|variation| value_of(&variation.id))
                .collect::<Option<Vec<Value>>>();
            let values = match values {
                Some(values) if !values.is_empty() => values,
                _ => {
                    warn!(
                        "rule {} of feature {} does not map every variation of experiment {}",
                        rule.id, feature.id, experiment.id
                    );
                    return None;
                }
            };
            let weights = if phase.variation_weights.len() == values.len() {
                phase.variation_weights.clone()
            } else {
                vec![1.0 / values.len() as f64; values.len()]
            };
            let condition = if phase.condition.trim().is_empty() {
                rule.condition.as_str()
            } else {
                phase.condition.as_str()
            };

            Some((
                PayloadRule {
                    key: Some(experiment.tracking_key.clone()),
                    variations: Some(values),
                    weights: Some(weights),
                    coverage: Some(phase.coverage),
                    hash_attribute: Some(experiment.hash_attribute.clone()),
                    namespace: phase.namespace.as_ref().and_then(|n| n.as_payload()),
                    ..Default::default()
                },
                condition,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentMap;
    use crate::saved_group::{GroupMap, SavedGroup};
    use crate::test_common::{fixed_date, TestStore};
    use assert_json_diff::assert_json_eq;
    use chrono::Duration;
    use maplit::hashmap;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    fn feature(value_type: &str) -> Feature {
        serde_json::from_value(json!({
            "id": "checkout",
            "defaultValue": "",
            "valueType": value_type,
            "environmentSettings": {"production": {"enabled": true}}
        }))
        .unwrap()
    }

    fn rule(value: Value) -> FeatureRule {
        serde_json::from_value(value).unwrap()
    }

    fn compile(resolver: &mut PrerequisiteResolver, rule: &FeatureRule) -> Option<Value> {
        resolver
            .compile_rule(rule, &feature("string"))
            .unwrap()
            .map(|compiled| serde_json::to_value(compiled).unwrap())
    }

    fn experiments() -> ExperimentMap {
        serde_json::from_value::<Vec<Experiment>>(json!([
            {"id": "exp_draft", "trackingKey": "draft", "variations": [{"id": "v0"}]},
            {"id": "exp_archived", "trackingKey": "archived", "status": "running", "archived": true,
             "variations": [{"id": "v0"}], "phases": [{"coverage": 1}]},
            {"id": "exp_stopped", "trackingKey": "stopped", "status": "stopped",
             "variations": [{"id": "v0"}, {"id": "v1"}], "phases": [{"coverage": 1}]},
            {"id": "exp_unweighted", "trackingKey": "unweighted", "status": "running",
             "variations": [{"id": "v0"}, {"id": "v1"}],
             "phases": [{"coverage": 0.5, "namespace": {"enabled": true, "name": "ns", "range": [0.5, 1]}}]}
        ]))
        .unwrap()
        .into_iter()
        .map(|experiment| (experiment.id.clone(), experiment))
        .collect()
    }

    #[test_case(json!({"type": "force", "id": "f", "value": "on", "condition": "{}"}), json!({"id": "f", "force": "on"}); "empty object condition is omitted")]
    #[test_case(json!({"type": "force", "value": "on", "condition": "  "}), json!({"force": "on"}); "blank id and condition are omitted")]
    #[test_case(json!({"type": "rollout", "value": "on", "coverage": 0.3}), json!({"force": "on", "coverage": 0.3, "hashAttribute": "id"}); "rollout")]
    #[test_case(json!({"type": "experiment", "values": [{"value": "a", "weight": 1}]}), json!({"key": "checkout", "variations": ["a"], "weights": [1.0], "coverage": 1.0, "hashAttribute": "id"}); "tracking key defaults to feature id")]
    fn compiles_rule_bodies(stored: Value, expected: Value) {
        let store = TestStore::new();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date());
        assert_json_eq!(compile(&mut resolver, &rule(stored)).unwrap(), expected);
    }

    #[test_case(r#"{"country": {"$bogus": 1}}"#; "unknown operator")]
    #[test_case("{not json"; "invalid json")]
    #[test_case(r#"["country"]"#; "not an object")]
    fn drops_rules_with_malformed_conditions(condition: &str) {
        let store = TestStore::new();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date());
        let stored = rule(json!({"type": "force", "value": "on", "condition": condition}));
        assert_that!(compile(&mut resolver, &stored)).is_none();
    }

    #[test]
    fn drops_rules_outside_their_schedule() {
        let store = TestStore::new();
        let stored = rule(json!({
            "type": "force",
            "value": "on",
            "scheduleRules": [{"timestamp": (fixed_date() + Duration::hours(1)).to_rfc3339(), "enabled": true}]
        }));

        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date());
        assert_that!(compile(&mut resolver, &stored)).is_none();

        let mut resolver =
            PrerequisiteResolver::new(&store, "production", fixed_date() + Duration::hours(2));
        assert_that!(compile(&mut resolver, &stored)).is_some();
    }

    #[test]
    fn expands_saved_groups_in_rule_conditions() {
        let store = TestStore::new();
        let groups: GroupMap = hashmap! {
            "admins".to_string() => SavedGroup { values: vec![json!("ada")] },
        };
        let mut resolver =
            PrerequisiteResolver::new(&store, "production", fixed_date()).with_group_map(&groups);
        let stored = rule(json!({
            "type": "force",
            "value": "on",
            "condition": r#"{"$or": [{"id": {"$inGroup": "admins"}}, {"id": {"$notInGroup": "nobody"}}]}"#
        }));

        assert_json_eq!(
            compile(&mut resolver, &stored).unwrap(),
            json!({
                "condition": {"$or": [{"id": {"$in": ["ada"]}}, {"id": {"$nin": []}}]},
                "force": "on"
            })
        );
    }

    #[test]
    fn rule_prerequisites_become_parent_conditions() {
        let store = TestStore::new();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date());
        let stored = rule(json!({
            "type": "force",
            "value": "on",
            "prerequisites": [
                {"id": "parentOn", "condition": r#"{"value": true}"#},
                {"id": "parentTargeted", "condition": r#"{"value": true}"#}
            ]
        }));

        assert_json_eq!(
            compile(&mut resolver, &stored).unwrap(),
            json!({
                "force": "on",
                "parentConditions": [{"id": "parentTargeted", "condition": {"value": true}}]
            })
        );
    }

    #[test_case("{}"; "empty condition")]
    #[test_case(r#"{"value": {"$exists": false}}"#; "absence condition")]
    fn rules_gated_on_missing_features_are_dropped(condition: &str) {
        let store = TestStore::new();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date());
        let stored = rule(json!({
            "type": "force",
            "value": "on",
            "prerequisites": [
                {"id": "parentOn", "condition": r#"{"value": true}"#},
                {"id": "deletedFeature", "condition": condition}
            ]
        }));
        assert_that!(compile(&mut resolver, &stored)).is_none();
    }

    #[test_case("exp_missing"; "unknown experiment")]
    #[test_case("exp_draft"; "draft experiment")]
    #[test_case("exp_archived"; "archived experiment")]
    #[test_case("exp_stopped"; "stopped without a released variation")]
    fn drops_experiment_refs_that_are_not_serving(experiment_id: &str) {
        let store = TestStore::new();
        let experiments = experiments();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date())
            .with_experiment_map(&experiments);
        let stored = rule(json!({
            "type": "experiment-ref",
            "experimentId": experiment_id,
            "variations": [{"variationId": "v0", "value": "a"}, {"variationId": "v1", "value": "b"}]
        }));
        assert_that!(compile(&mut resolver, &stored)).is_none();
    }

    #[test]
    fn experiment_refs_need_an_experiment_map() {
        let store = TestStore::new();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date());
        let stored = rule(json!({"type": "experiment-ref", "experimentId": "exp_unweighted"}));
        assert_that!(compile(&mut resolver, &stored)).is_none();
    }

    #[test]
    fn running_experiment_ref_without_weights_splits_evenly() {
        let store = TestStore::new();
        let experiments = experiments();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date())
            .with_experiment_map(&experiments);
        let stored = rule(json!({
            "type": "experiment-ref",
            "id": "ref",
            "condition": r#"{"plan": "pro"}"#,
            "experimentId": "exp_unweighted",
            "variations": [{"variationId": "v1", "value": "b"}, {"variationId": "v0", "value": "a"}]
        }));

        assert_json_eq!(
            compile(&mut resolver, &stored).unwrap(),
            json!({
                "id": "ref",
                "condition": {"plan": "pro"},
                "key": "unweighted",
                "variations": ["a", "b"],
                "weights": [0.5, 0.5],
                "coverage": 0.5,
                "hashAttribute": "id",
                "namespace": ["ns", 0.5, 1.0]
            })
        );
    }

    #[test]
    fn experiment_ref_missing_a_variation_value_is_dropped() {
        let store = TestStore::new();
        let experiments = experiments();
        let mut resolver = PrerequisiteResolver::new(&store, "production", fixed_date())
            .with_experiment_map(&experiments);
        let stored = rule(json!({
            "type": "experiment-ref",
            "experimentId": "exp_unweighted",
            "variations": [{"variationId": "v0", "value": "a"}]
        }));
        assert_that!(compile(&mut resolver, &stored)).is_none();
    }
}
