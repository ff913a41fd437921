use serde::Serialize;

use crate::attribute_value::AttributeValue;
use crate::condition::{Condition, Truth};

/// Attribute path under which a prerequisite condition sees its parent's served value.
pub const PARENT_VALUE_PATH: &str = "value";

/// Outcome of evaluating a condition when only the parent's served value is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Satisfiability {
    /// The condition holds whatever the other attributes are.
    AlwaysTrue,
    /// The condition fails whatever the other attributes are.
    AlwaysFalse,
    /// The outcome hinges on attributes that are only known at evaluation time.
    Depends,
}

impl From<bool> for Satisfiability {
    fn from(b: bool) -> Self {
        if b {
            Satisfiability::AlwaysTrue
        } else {
            Satisfiability::AlwaysFalse
        }
    }
}

impl Truth for Satisfiability {
    const TRUE: Self = Satisfiability::AlwaysTrue;
    const FALSE: Self = Satisfiability::AlwaysFalse;

    fn and(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (AlwaysFalse, _) | (_, AlwaysFalse) => AlwaysFalse,
            (AlwaysTrue, AlwaysTrue) => AlwaysTrue,
            _ => Depends,
        }
    }

    fn or(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (AlwaysTrue, _) | (_, AlwaysTrue) => AlwaysTrue,
            (AlwaysFalse, AlwaysFalse) => AlwaysFalse,
            _ => Depends,
        }
    }

    fn not(self) -> Self {
        match self {
            Satisfiability::AlwaysTrue => Satisfiability::AlwaysFalse,
            Satisfiability::AlwaysFalse => Satisfiability::AlwaysTrue,
            Satisfiability::Depends => Satisfiability::Depends,
        }
    }
}

impl Condition {
    /// Decide the condition with `value` fixed to `fixed_value` and every other attribute free.
    ///
    /// Tests on `value` (or a path below it) are evaluated concretely; any other attribute test
    /// is [Satisfiability::Depends], which combinators propagate with three-valued logic. A
    /// malformed condition is [Satisfiability::AlwaysFalse].
    pub fn evaluate_against_fixed_value(&self, fixed_value: &AttributeValue) -> Satisfiability {
        self.fold(&|path, test| match parent_value_path(path) {
            Some(None) => test.matches(Some(fixed_value)).into(),
            Some(Some(rest)) => test.matches(fixed_value.get_path(rest)).into(),
            None => Satisfiability::Depends,
        })
    }
}

// Some(None) for `value` itself, Some(Some(rest)) for `value.rest`.
fn parent_value_path(path: &str) -> Option<Option<&str>> {
    if path == PARENT_VALUE_PATH {
        return Some(None);
    }
    path.strip_prefix(PARENT_VALUE_PATH)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(Some)
}
