use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use crate::attribute_value::AttributeValue;
use crate::condition::Condition;
use crate::error::Error;
use crate::experiment::ExperimentMap;
use crate::feature::{EnvironmentSettings, Feature, Prerequisite};
use crate::payload::{ParentCondition, PayloadEntry, PayloadRule};
use crate::satisfiability::Satisfiability;
use crate::saved_group::GroupMap;
use crate::store::Store;

/// Upper bound on nested prerequisite resolution. Deeper chains are reported as an error instead
/// of recursing further.
pub const MAX_PREREQUISITE_DEPTH: usize = 64;

const PREALLOCATED_RESOLUTION_CHAIN_SIZE: usize = 20;

/// What a parent feature means for one condition tested against its served value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrerequisiteState {
    /// Every value the parent can serve satisfies the condition.
    Live,
    /// The parent is missing, disabled, blocked by its own prerequisites, or no value it can
    /// serve satisfies the condition.
    Off,
    /// Whether the condition is satisfied depends on runtime targeting.
    Conditional,
}

/// The combined outcome of a list of prerequisites.
#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome {
    /// Every prerequisite is live; no runtime check is needed.
    Open,
    /// At least one prerequisite is off.
    Blocked { prerequisite_id: String },
    /// The prerequisites that SDKs still have to check, in declaration order.
    Gated(Vec<ParentCondition>),
}

// What a feature can serve in the resolver's environment.
#[derive(Clone, Debug)]
enum Outlook {
    Blocked,
    Served {
        entry: PayloadEntry,
        // Own prerequisites are conditional, so the feature may be blocked at runtime.
        gated: bool,
        // Distinct values reachable through the compiled rules and the default value.
        values: Vec<AttributeValue>,
    },
}

/// Resolves prerequisite states for the features of one environment.
///
/// A resolver memoizes everything it computes, so it must only live for a single payload
/// generation; create a new one per call.
pub struct PrerequisiteResolver<'a> {
    store: &'a dyn Store,
    environment: &'a str,
    pub(crate) date: DateTime<Utc>,
    pub(crate) group_map: Option<&'a GroupMap>,
    pub(crate) experiment_map: Option<&'a ExperimentMap>,
    outlooks: HashMap<String, Outlook>,
    states: HashMap<(String, String), PrerequisiteState>,
    resolution_chain: Vec<String>,
}

impl<'a> PrerequisiteResolver<'a> {
    /// `date` is the instant rule schedules are evaluated at.
    pub fn new(store: &'a dyn Store, environment: &'a str, date: DateTime<Utc>) -> Self {
        Self {
            store,
            environment,
            date,
            group_map: None,
            experiment_map: None,
            outlooks: HashMap::new(),
            states: HashMap::new(),
            resolution_chain: Vec::with_capacity(PREALLOCATED_RESOLUTION_CHAIN_SIZE),
        }
    }

    pub fn with_group_map(mut self, group_map: &'a GroupMap) -> Self {
        self.group_map = Some(group_map);
        self
    }

    pub fn with_experiment_map(mut self, experiment_map: &'a ExperimentMap) -> Self {
        self.experiment_map = Some(experiment_map);
        self
    }

    /// Determine whether feature `feature_id` satisfies the JSON-encoded `condition` over its
    /// served value.
    pub fn resolve(
        &mut self,
        feature_id: &str,
        condition: &str,
    ) -> Result<PrerequisiteState, Error> {
        let key = (feature_id.to_owned(), fingerprint(condition));
        if let Some(state) = self.states.get(&key) {
            return Ok(*state);
        }

        let parsed = Condition::parse(condition);
        let state = match self.outlook(feature_id)? {
            Outlook::Blocked => PrerequisiteState::Off,
            Outlook::Served { gated, values, .. } => classify(&parsed, values, *gated),
        };
        self.states.insert(key, state);
        Ok(state)
    }

    /// The payload entry of `feature_id`, or None if the feature is blocked in this environment.
    pub fn payload_entry(&mut self, feature_id: &str) -> Result<Option<PayloadEntry>, Error> {
        Ok(match self.outlook(feature_id)? {
            Outlook::Blocked => None,
            Outlook::Served { entry, .. } => Some(entry.clone()),
        })
    }

    /// Resolve every prerequisite in `prerequisites`; the list holds only if all of them do.
    ///
    /// `gate` marks the surviving parent conditions as feature-level gates.
    pub fn resolve_prerequisites(
        &mut self,
        prerequisites: &[Prerequisite],
        gate: bool,
    ) -> Result<GateOutcome, Error> {
        let mut parent_conditions = Vec::new();
        for prerequisite in prerequisites {
            match self.resolve(&prerequisite.id, &prerequisite.condition)? {
                PrerequisiteState::Off => {
                    return Ok(GateOutcome::Blocked {
                        prerequisite_id: prerequisite.id.clone(),
                    })
                }
                PrerequisiteState::Live => (),
                PrerequisiteState::Conditional => parent_conditions.push(ParentCondition {
                    id: prerequisite.id.clone(),
                    condition: condition_value(&prerequisite.condition),
                    gate,
                }),
            }
        }

        if parent_conditions.is_empty() {
            Ok(GateOutcome::Open)
        } else {
            Ok(GateOutcome::Gated(parent_conditions))
        }
    }

    fn outlook(&mut self, feature_id: &str) -> Result<&Outlook, Error> {
        if !self.outlooks.contains_key(feature_id) {
            let outlook = self.compute_outlook(feature_id)?;
            self.outlooks.insert(feature_id.to_owned(), outlook);
        }
        Ok(&self.outlooks[feature_id])
    }

    fn compute_outlook(&mut self, feature_id: &str) -> Result<Outlook, Error> {
        let store = self.store;
        let feature = match store.feature(feature_id) {
            Some(feature) => feature,
            None => {
                debug!("prerequisite {} does not exist; treating it as off", feature_id);
                return Ok(Outlook::Blocked);
            }
        };
        let settings = match feature.enabled_settings(self.environment) {
            Some(settings) => settings,
            None => return Ok(Outlook::Blocked),
        };

        self.enter(feature_id)?;
        let outlook = self.build_outlook(feature, settings);
        self.resolution_chain.pop();
        outlook
    }

    fn enter(&mut self, feature_id: &str) -> Result<(), Error> {
        if self.resolution_chain.iter().any(|id| id == feature_id) {
            let mut chain = self.resolution_chain.clone();
            chain.push(feature_id.to_owned());
            warn!(
                "prerequisite relationship to {} caused a circular reference",
                feature_id
            );
            return Err(Error::CyclicPrerequisite {
                feature_id: feature_id.to_owned(),
                chain,
            });
        }
        if self.resolution_chain.len() >= MAX_PREREQUISITE_DEPTH {
            return Err(Error::PrerequisiteDepthExceeded {
                feature_id: feature_id.to_owned(),
                max_depth: MAX_PREREQUISITE_DEPTH,
            });
        }
        self.resolution_chain.push(feature_id.to_owned());
        Ok(())
    }

    fn build_outlook(
        &mut self,
        feature: &Feature,
        settings: &EnvironmentSettings,
    ) -> Result<Outlook, Error> {
        let mut rules = Vec::with_capacity(settings.rules.len() + 1);
        let gated = match self.resolve_prerequisites(&feature.prerequisites, true)? {
            GateOutcome::Blocked { prerequisite_id } => {
                debug!(
                    "feature {} is blocked by prerequisite {}",
                    feature.id, prerequisite_id
                );
                return Ok(Outlook::Blocked);
            }
            GateOutcome::Open => false,
            GateOutcome::Gated(parent_conditions) => {
                rules.push(PayloadRule::gate(parent_conditions));
                true
            }
        };

        let mut values = Vec::new();
        let mut reachable = true;
        for rule in &settings.rules {
            let compiled = match self.compile_rule(rule, feature)? {
                Some(compiled) => compiled,
                None => continue,
            };
            if reachable {
                for value in compiled.served_values() {
                    push_distinct(&mut values, value.into());
                }
                // Nothing after a rule that applies to everyone is ever served.
                reachable = !compiled.applies_to_everyone();
            }
            rules.push(compiled);
        }

        let default_value = feature.typed_value(&feature.default_value);
        if reachable {
            push_distinct(&mut values, (&default_value).into());
        }

        Ok(Outlook::Served {
            entry: PayloadEntry {
                default_value,
                rules,
            },
            gated,
            values,
        })
    }
}

fn classify(condition: &Condition, values: &[AttributeValue], gated: bool) -> PrerequisiteState {
    let outcomes: Vec<Satisfiability> = values
        .iter()
        .map(|value| condition.evaluate_against_fixed_value(value))
        .collect();

    if outcomes.iter().all(|o| *o == Satisfiability::AlwaysFalse) {
        PrerequisiteState::Off
    } else if !gated && outcomes.iter().all(|o| *o == Satisfiability::AlwaysTrue) {
        PrerequisiteState::Live
    } else {
        PrerequisiteState::Conditional
    }
}

fn push_distinct(values: &mut Vec<AttributeValue>, value: AttributeValue) {
    if !values.contains(&value) {
        values.push(value);
    }
}

// Canonical form of a JSON-encoded condition, so that formatting differences share a memo entry.
fn fingerprint(condition: &str) -> String {
    serde_json::from_str::<Value>(condition)
        .map(|value| value.to_string())
        .unwrap_or_else(|_| condition.trim().to_owned())
}

// Conditions that reach this point have already been found satisfiable, so they parse.
fn condition_value(condition: &str) -> Value {
    if condition.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(condition).unwrap_or_else(|e| {
        warn!("unparseable prerequisite condition ({}): {}", e, condition);
        Value::Object(Default::default())
    })
}
