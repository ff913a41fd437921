use std::collections::HashMap;

use serde::Deserialize;

use crate::rule::NamespaceSettings;
use crate::util::{default_hash_attribute, full_coverage};

/// Standalone experiments referenced by `experiment-ref` rules, keyed by experiment id.
pub type ExperimentMap = HashMap<String, Experiment>;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    pub tracking_key: String,
    #[serde(default = "default_hash_attribute")]
    pub hash_attribute: String,
    #[serde(default)]
    pub status: ExperimentStatus,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub released_variation_id: Option<String>,
    pub variations: Vec<ExperimentVariation>,
    #[serde(default)]
    pub phases: Vec<ExperimentPhase>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    #[default]
    Draft,
    Running,
    Stopped,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExperimentVariation {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentPhase {
    #[serde(default = "full_coverage")]
    pub coverage: f64,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub variation_weights: Vec<f64>,
    #[serde(default)]
    pub namespace: Option<NamespaceSettings>,
}

impl Experiment {
    /// The phase currently in effect.
    pub fn current_phase(&self) -> Option<&ExperimentPhase> {
        self.phases.last()
    }
}
