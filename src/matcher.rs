use std::cmp::Ordering;

use crate::attribute_value::AttributeValue;
use crate::condition::{Comparison, Condition, ElementTest, Operator, ValueTest};

impl Condition {
    /// Evaluate the condition against a concrete attribute object.
    ///
    /// Attribute paths are dotted (`company.plan`). A missing attribute only satisfies operators
    /// that are explicitly about absence (`$exists: false`, `$ne`, `$nin`, negations).
    pub fn matches(&self, attributes: &AttributeValue) -> bool {
        self.fold(&|path, test| test.matches(attributes.get_path(path)))
    }
}

impl ValueTest {
    /// Test the value found at an attribute path; `None` means the path did not resolve.
    pub fn matches(&self, actual: Option<&AttributeValue>) -> bool {
        match self {
            ValueTest::Literal(expected) => actual == Some(expected),
            ValueTest::Operators(operators) => operators.iter().all(|op| op.matches(actual)),
        }
    }
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
        }
    }
}

impl Operator {
    fn matches(&self, actual: Option<&AttributeValue>) -> bool {
        match self {
            Operator::Eq(expected) => actual == Some(expected),
            Operator::Ne(expected) => actual != Some(expected),
            Operator::In(list) => is_in(actual, list),
            Operator::Nin(list) => !is_in(actual, list),
            Operator::Exists(expected) => exists(actual) == *expected,

            Operator::Compare(comparison, expected) => actual
                .and_then(|v| v.natural_cmp(expected))
                .map(|ordering| comparison.holds(ordering))
                .unwrap_or(false),
            Operator::Version(comparison, expected) => actual
                .and_then(AttributeValue::as_version)
                .map(|version| comparison.holds(version.cmp(expected)))
                .unwrap_or(false),
            Operator::Regex(regex) => actual
                .and_then(AttributeValue::as_str)
                .map(|s| regex.is_match(s))
                .unwrap_or(false),

            // array ops
            Operator::Size(test) => match actual {
                Some(AttributeValue::Array(items)) => {
                    test.matches(Some(&AttributeValue::Number(items.len() as f64)))
                }
                _ => false,
            },
            Operator::ElemMatch(test) => match actual {
                Some(AttributeValue::Array(items)) => items.iter().any(|item| match test.as_ref() {
                    ElementTest::Value(test) => test.matches(Some(item)),
                    ElementTest::Document(condition) => condition.matches(item),
                }),
                _ => false,
            },
            Operator::All(expected) => match actual {
                Some(AttributeValue::Array(items)) => {
                    expected.iter().all(|value| items.contains(value))
                }
                _ => false,
            },

            Operator::Type(name) => type_name(actual) == name.as_str(),
            Operator::Not(test) => !test.matches(actual),
        }
    }
}

fn exists(actual: Option<&AttributeValue>) -> bool {
    !matches!(actual, None | Some(AttributeValue::Null))
}

// An array attribute is in the list if any of its elements is.
fn is_in(actual: Option<&AttributeValue>, list: &[AttributeValue]) -> bool {
    match actual {
        Some(AttributeValue::Array(items)) => items.iter().any(|item| list.contains(item)),
        Some(value) => list.contains(value),
        None => false,
    }
}

fn type_name(actual: Option<&AttributeValue>) -> &'static str {
    actual.map(AttributeValue::type_name).unwrap_or("undefined")
}
