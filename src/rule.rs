use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::feature::Prerequisite;
use crate::util::{default_hash_attribute, default_true, full_coverage};

/// One targeting rule of a feature in one environment.
///
/// Rules are evaluated in order by SDKs, so their position is their priority.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub schedule_rules: Vec<ScheduleRule>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleKind {
    /// Serve `value` to everyone matching the condition.
    #[serde(rename_all = "camelCase")]
    Force { value: String },
    /// Serve `value` to a `coverage` fraction of the matching population.
    #[serde(rename_all = "camelCase")]
    Rollout {
        value: String,
        #[serde(default = "full_coverage")]
        coverage: f64,
        #[serde(default = "default_hash_attribute")]
        hash_attribute: String,
    },
    /// An inline experiment splitting traffic between `values`.
    #[serde(rename_all = "camelCase")]
    Experiment {
        #[serde(default)]
        tracking_key: String,
        #[serde(default = "default_hash_attribute")]
        hash_attribute: String,
        #[serde(default = "full_coverage")]
        coverage: f64,
        values: Vec<ExperimentValue>,
        #[serde(default)]
        namespace: Option<NamespaceSettings>,
    },
    /// A reference to a standalone experiment, resolved through the experiment map.
    #[serde(rename_all = "camelCase")]
    ExperimentRef {
        experiment_id: String,
        #[serde(default)]
        variations: Vec<ExperimentRefVariation>,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExperimentValue {
    pub value: String,
    pub weight: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRefVariation {
    pub variation_id: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct NamespaceSettings {
    #[serde(default)]
    pub enabled: bool,
    pub name: String,
    pub range: (f64, f64),
}

impl NamespaceSettings {
    /// The `[name, start, end]` triple SDKs expect, if the namespace is in use.
    pub(crate) fn as_payload(&self) -> Option<(String, f64, f64)> {
        if self.enabled {
            Some((self.name.clone(), self.range.0, self.range.1))
        } else {
            None
        }
    }
}

/// A scheduled change to a rule's enabled state. An entry without a timestamp is the initial
/// state.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub enabled: bool,
}

impl FeatureRule {
    /// Whether the rule is switched on at `date`, taking its schedule into account.
    ///
    /// With a schedule, the rule takes the state of the latest entry that has come into effect;
    /// before the first entry takes effect it is off.
    pub fn is_active_at(&self, date: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if self.schedule_rules.is_empty() {
            return true;
        }

        let mut entries: Vec<(Option<DateTime<Utc>>, bool)> = self
            .schedule_rules
            .iter()
            .filter_map(|entry| match &entry.timestamp {
                None => Some((None, entry.enabled)),
                Some(timestamp) => match DateTime::parse_from_rfc3339(timestamp) {
                    Ok(t) => Some((Some(t.with_timezone(&Utc)), entry.enabled)),
                    Err(e) => {
                        warn!(
                            "ignoring schedule entry of rule {} with invalid timestamp ({}): {}",
                            self.id, e, timestamp
                        );
                        None
                    }
                },
            })
            .collect();
        entries.sort_by_key(|(timestamp, _)| *timestamp);

        entries
            .iter()
            .filter(|(timestamp, _)| timestamp.map(|t| t <= date).unwrap_or(true))
            .last()
            .map(|(_, enabled)| *enabled)
            .unwrap_or(false)
    }
}
