use itertools::Itertools;
use thiserror::Error;

/// Errors that abort payload generation. Everything else (missing parents, malformed
/// conditions) fails closed without an error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A feature was reached again while its own prerequisites were still being resolved.
    #[error("prerequisite cycle detected at feature {feature_id}: {}", .chain.iter().join(" -> "))]
    CyclicPrerequisite {
        feature_id: String,
        /// The resolution path, from the feature resolution started at up to the repeated one.
        chain: Vec<String>,
    },
    /// The prerequisite chain is deeper than [crate::MAX_PREREQUISITE_DEPTH].
    #[error("prerequisite chain at feature {feature_id} exceeds the maximum depth of {max_depth}")]
    PrerequisiteDepthExceeded { feature_id: String, max_depth: usize },
}
