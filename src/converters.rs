//! Zero-panic conversion utilities with explicit error handling
use crate::component::State;
use crate::errors::ReconcileError;
use crate::types::{PropValue, Props};
use serde_json::{Map, Value};

/// Convert a JSON value into a state patch; only objects are accepted.
pub fn value_to_state(value: Value) -> Result<State, ReconcileError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ReconcileError::TypeConversionError {
            expected: "object".into(),
            actual: json_type_name(&other).into(),
        }),
    }
}

/// Plain-data view of a property map, used in debug logging.
/// Handlers appear as `"[handler]"`; children are summarized by count.
pub fn props_to_json(props: &Props) -> Value {
    let mut map = Map::new();
    for (key, value) in props.iter() {
        let json = match value {
            PropValue::Value(v) => v.clone(),
            PropValue::Handler(_) => Value::String("[handler]".into()),
        };
        map.insert(key.clone(), json);
    }
    if !props.children().is_empty() {
        map.insert("children".into(), Value::from(props.children().len()));
    }
    Value::Object(map)
}

/// Text a host should show for a property value: strings verbatim, `null`
/// as nothing, everything else in its JSON form.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_to_state_requires_object() {
        assert_eq!(value_to_state(json!({"a": 1})).unwrap().get("a"), Some(&json!(1)));

        match value_to_state(json!("nope")) {
            Err(ReconcileError::TypeConversionError { expected, actual }) => {
                assert_eq!(expected, "object");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_props_to_json_masks_handlers() {
        let props = Props::new().set("id", "main").on("onClick", |_| {});
        assert_eq!(props_to_json(&props), json!({"id": "main", "onClick": "[handler]"}));
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("hi")), "hi");
        assert_eq!(value_to_text(&json!(null)), "");
        assert_eq!(value_to_text(&json!(3)), "3");
        assert_eq!(value_to_text(&json!(true)), "true");
    }
}
