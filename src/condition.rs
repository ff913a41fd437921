use log::warn;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::attribute_value::AttributeValue;
use crate::version::DottedVersion;

/// A targeting condition, parsed once from its JSON encoding.
///
/// Conditions use a MongoDB-style query language: the keys of an object are either attribute
/// paths (tested with a [ValueTest]) or logical combinators (`$and`, `$or`, `$nor`, `$not`). All
/// entries of an object must hold.
///
/// A condition that contains anything malformed, anywhere, is represented as
/// [Condition::Malformed] as a whole. A malformed condition never matches, so negating part of it
/// can never make it match.
#[derive(Clone, Debug)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Nor(Vec<Condition>),
    Not(Box<Condition>),
    Field { path: String, test: ValueTest },
    Malformed,
}

/// The test applied to the value found at an attribute path.
#[derive(Clone, Debug)]
pub enum ValueTest {
    /// A bare value is an implicit `$eq`.
    Literal(AttributeValue),
    /// An operator object; every operator must pass.
    Operators(Vec<Operator>),
}

#[derive(Clone, Debug)]
pub enum Operator {
    Eq(AttributeValue),
    Ne(AttributeValue),
    In(Vec<AttributeValue>),
    Nin(Vec<AttributeValue>),
    Exists(bool),
    Compare(Comparison, AttributeValue),
    Version(Comparison, DottedVersion),
    Regex(Regex),
    Size(Box<ValueTest>),
    ElemMatch(Box<ElementTest>),
    All(Vec<AttributeValue>),
    Type(String),
    Not(Box<ValueTest>),
}

/// `$elemMatch` accepts either an operator object, applied to each element directly, or a
/// nested condition, applied to each element as if it were an attribute object.
#[derive(Clone, Debug)]
pub enum ElementTest {
    Value(ValueTest),
    Document(Condition),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub(crate) struct MalformedCondition(String);

impl MalformedCondition {
    fn new(message: impl Into<String>) -> Self {
        MalformedCondition(message.into())
    }
}

/// Boolean-like domain the condition combinators fold into.
///
/// The concrete matcher folds into `bool` and the abstract evaluator into
/// [crate::Satisfiability]; both walk the tree through [Condition::fold], so they always agree on
/// which combinators and operators exist.
pub(crate) trait Truth: Copy + PartialEq {
    const TRUE: Self;
    const FALSE: Self;

    fn and(self, other: Self) -> Self;
    fn or(self, other: Self) -> Self;
    fn not(self) -> Self;
}

impl Truth for bool {
    const TRUE: Self = true;
    const FALSE: Self = false;

    fn and(self, other: Self) -> Self {
        self && other
    }

    fn or(self, other: Self) -> Self {
        self || other
    }

    fn not(self) -> Self {
        !self
    }
}

fn all<T: Truth>(items: impl Iterator<Item = T>) -> T {
    let mut acc = T::TRUE;
    for item in items {
        acc = acc.and(item);
        if acc == T::FALSE {
            break;
        }
    }
    acc
}

fn any<T: Truth>(items: impl Iterator<Item = T>) -> T {
    let mut acc = T::FALSE;
    for item in items {
        acc = acc.or(item);
        if acc == T::TRUE {
            break;
        }
    }
    acc
}

impl Condition {
    /// A condition that holds for every attribute set.
    pub fn always() -> Condition {
        Condition::And(Vec::new())
    }

    /// Parse a JSON-encoded condition. An empty string is the same as `{}` and always holds;
    /// anything that is not a valid condition yields [Condition::Malformed].
    pub fn parse(raw: &str) -> Condition {
        let raw = raw.trim();
        if raw.is_empty() {
            return Condition::always();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Condition::from_value(&value),
            Err(e) => {
                warn!("condition is not valid JSON ({}): {}", e, raw);
                Condition::Malformed
            }
        }
    }

    pub fn from_value(value: &Value) -> Condition {
        parse_document(value).unwrap_or_else(|e| {
            warn!("malformed condition ({}): {}", e, value);
            Condition::Malformed
        })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Condition::Malformed)
    }

    /// Fold the condition tree into `T`, asking `leaf` for the outcome of every attribute test.
    /// Combinators short-circuit as soon as their outcome is settled.
    pub(crate) fn fold<T, F>(&self, leaf: &F) -> T
    where
        T: Truth,
        F: Fn(&str, &ValueTest) -> T,
    {
        match self {
            Condition::And(conditions) => all(conditions.iter().map(|c| c.fold(leaf))),
            Condition::Or(conditions) if conditions.is_empty() => T::TRUE,
            Condition::Or(conditions) => any(conditions.iter().map(|c| c.fold(leaf))),
            Condition::Nor(conditions) if conditions.is_empty() => T::FALSE,
            Condition::Nor(conditions) => any(conditions.iter().map(|c| c.fold(leaf))).not(),
            Condition::Not(condition) => condition.fold(leaf).not(),
            Condition::Field { path, test } => leaf(path, test),
            Condition::Malformed => T::FALSE,
        }
    }
}

/// True for a non-empty object whose keys are all operators.
pub(crate) fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .map(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
        .unwrap_or(false)
}

fn parse_document(value: &Value) -> Result<Condition, MalformedCondition> {
    let map = value
        .as_object()
        .ok_or_else(|| MalformedCondition::new("expected an object"))?;
    let mut entries = map
        .iter()
        .map(|(key, value)| parse_entry(key, value))
        .collect::<Result<Vec<_>, _>>()?;

    if entries.len() == 1 {
        Ok(entries.remove(0))
    } else {
        Ok(Condition::And(entries))
    }
}

fn parse_entry(key: &str, value: &Value) -> Result<Condition, MalformedCondition> {
    match key {
        "$and" => Ok(Condition::And(parse_list(key, value)?)),
        "$or" => Ok(Condition::Or(parse_list(key, value)?)),
        "$nor" => Ok(Condition::Nor(parse_list(key, value)?)),
        "$not" => Ok(Condition::Not(Box::new(parse_document(value)?))),
        _ if key.starts_with('$') => Err(MalformedCondition::new(format!(
            "unknown logical operator {}",
            key
        ))),
        path => Ok(Condition::Field {
            path: path.to_owned(),
            test: parse_value_test(value)?,
        }),
    }
}

fn parse_list(key: &str, value: &Value) -> Result<Vec<Condition>, MalformedCondition> {
    value
        .as_array()
        .ok_or_else(|| MalformedCondition::new(format!("{} expects an array", key)))?
        .iter()
        .map(parse_document)
        .collect()
}

fn parse_value_test(value: &Value) -> Result<ValueTest, MalformedCondition> {
    match value {
        Value::Object(map) if is_operator_object(value) => parse_operators(map),
        _ => Ok(ValueTest::Literal(value.into())),
    }
}

fn parse_operators(map: &Map<String, Value>) -> Result<ValueTest, MalformedCondition> {
    map.iter()
        .map(|(op, operand)| parse_operator(op, operand))
        .collect::<Result<Vec<_>, _>>()
        .map(ValueTest::Operators)
}

fn parse_operator(op: &str, operand: &Value) -> Result<Operator, MalformedCondition> {
    let operator = match op {
        "$eq" => Operator::Eq(operand.into()),
        "$ne" => Operator::Ne(operand.into()),
        "$in" => Operator::In(operand_list(op, operand)?),
        "$nin" => Operator::Nin(operand_list(op, operand)?),
        "$all" => Operator::All(operand_list(op, operand)?),
        "$exists" => Operator::Exists(
            operand
                .as_bool()
                .ok_or_else(|| MalformedCondition::new("$exists expects a boolean"))?,
        ),
        "$gt" => Operator::Compare(Comparison::Gt, operand.into()),
        "$gte" => Operator::Compare(Comparison::Gte, operand.into()),
        "$lt" => Operator::Compare(Comparison::Lt, operand.into()),
        "$lte" => Operator::Compare(Comparison::Lte, operand.into()),
        "$veq" => Operator::Version(Comparison::Eq, operand_version(op, operand)?),
        "$vne" => Operator::Version(Comparison::Ne, operand_version(op, operand)?),
        "$vgt" => Operator::Version(Comparison::Gt, operand_version(op, operand)?),
        "$vgte" => Operator::Version(Comparison::Gte, operand_version(op, operand)?),
        "$vlt" => Operator::Version(Comparison::Lt, operand_version(op, operand)?),
        "$vlte" => Operator::Version(Comparison::Lte, operand_version(op, operand)?),
        "$regex" => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| MalformedCondition::new("$regex expects a string"))?;
            let regex = Regex::new(pattern).map_err(|e| {
                MalformedCondition::new(format!("invalid regex for $regex ({}): {}", e, pattern))
            })?;
            Operator::Regex(regex)
        }
        "$size" => Operator::Size(Box::new(parse_value_test(operand)?)),
        "$elemMatch" => {
            let test = if is_operator_object(operand) {
                ElementTest::Value(parse_value_test(operand)?)
            } else {
                ElementTest::Document(parse_document(operand)?)
            };
            Operator::ElemMatch(Box::new(test))
        }
        "$type" => Operator::Type(
            operand
                .as_str()
                .ok_or_else(|| MalformedCondition::new("$type expects a string"))?
                .to_owned(),
        ),
        "$not" => Operator::Not(Box::new(parse_value_test(operand)?)),
        _ => {
            return Err(MalformedCondition::new(format!(
                "unknown operator {}",
                op
            )))
        }
    };
    Ok(operator)
}

fn operand_list(op: &str, operand: &Value) -> Result<Vec<AttributeValue>, MalformedCondition> {
    operand
        .as_array()
        .map(|items| items.iter().map(AttributeValue::from).collect())
        .ok_or_else(|| MalformedCondition::new(format!("{} expects an array", op)))
}

fn operand_version(op: &str, operand: &Value) -> Result<DottedVersion, MalformedCondition> {
    AttributeValue::from(operand)
        .as_version()
        .ok_or_else(|| MalformedCondition::new(format!("{} expects a version string", op)))
}
