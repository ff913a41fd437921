use std::collections::HashMap;

use log::warn;

use crate::feature::Feature;

/// Store is an interface for looking up the features a payload is built from.
///
/// A feature that the store does not know about is treated as deleted: it can never satisfy a
/// prerequisite.
pub trait Store {
    /// Retrieve the feature with id `feature_id`.
    fn feature(&self, feature_id: &str) -> Option<&Feature>;
}

/// A [Store] over a borrowed list of features, indexed by id.
#[derive(Debug, Default)]
pub struct FeatureIndex<'a> {
    features: HashMap<&'a str, &'a Feature>,
}

impl<'a> FeatureIndex<'a> {
    /// Index `features` by id. When ids collide the first feature wins.
    pub fn new(features: &'a [Feature]) -> Self {
        let mut index = HashMap::with_capacity(features.len());
        for feature in features {
            if index.contains_key(feature.id.as_str()) {
                warn!("duplicate feature id {}; keeping the first definition", feature.id);
                continue;
            }
            index.insert(feature.id.as_str(), feature);
        }
        Self { features: index }
    }
}

impl Store for FeatureIndex<'_> {
    fn feature(&self, feature_id: &str) -> Option<&Feature> {
        self.features.get(feature_id).copied()
    }
}
