use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::util::f64_to_i64_safe;

/// The declared type of a feature's values.
///
/// Feature values are always stored as strings; the value type decides how they are turned into
/// the typed JSON value that SDKs receive and that prerequisite conditions are tested against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Boolean,
    String,
    Number,
    Json,
}

impl ValueType {
    /// Parse a stored value into its typed JSON form.
    ///
    /// * boolean: `"false"` and the empty string are false, anything else is true
    /// * number: parsed as a float, falling back to 0; integral values become JSON integers
    /// * string: used verbatim
    /// * json: parsed, or null if the stored text is not valid JSON
    pub fn parse(&self, raw: &str) -> Value {
        match self {
            ValueType::Boolean => Value::Bool(!(raw.is_empty() || raw == "false")),
            ValueType::String => Value::String(raw.to_owned()),
            ValueType::Number => number_value(raw.trim().parse::<f64>().unwrap_or(0.0)),
            ValueType::Json => serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!("unparseable json value ({}): {}", e, raw);
                Value::Null
            }),
        }
    }
}

#[allow(clippy::float_cmp)]
fn number_value(f: f64) -> Value {
    if !f.is_finite() {
        return Value::from(0);
    }
    match f64_to_i64_safe(f) {
        Some(i) if i as f64 == f => Value::from(i),
        _ => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(ValueType::Boolean, "true", json!(true))]
    #[test_case(ValueType::Boolean, "false", json!(false))]
    #[test_case(ValueType::Boolean, "", json!(false))]
    #[test_case(ValueType::Boolean, "yes", json!(true))]
    #[test_case(ValueType::String, "false", json!("false"))]
    #[test_case(ValueType::Number, "12", json!(12))]
    #[test_case(ValueType::Number, " 1.5 ", json!(1.5))]
    #[test_case(ValueType::Number, "-0", json!(0))]
    #[test_case(ValueType::Number, "twelve", json!(0))]
    #[test_case(ValueType::Number, "NaN", json!(0))]
    #[test_case(ValueType::Number, "9007199254740993", json!(9007199254740992.0_f64))]
    #[test_case(ValueType::Json, r#"{"theme": "dark"}"#, json!({"theme": "dark"}))]
    #[test_case(ValueType::Json, "{broken", Value::Null)]
    fn parses_stored_values(value_type: ValueType, raw: &str, expected: Value) {
        assert_eq!(value_type.parse(raw), expected);
    }

    #[test]
    fn deserializes_value_types() {
        let types: Vec<ValueType> =
            serde_json::from_str(r#"["boolean", "string", "number", "json"]"#).unwrap();
        assert_eq!(
            types,
            vec![
                ValueType::Boolean,
                ValueType::String,
                ValueType::Number,
                ValueType::Json
            ]
        );
    }
}
