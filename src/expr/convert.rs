//! Value conversion between serde_json::Value and cel_interpreter types

use cel_interpreter::objects::Value as CelValue;
use serde_json::Value as JsonValue;

use crate::expr::error::{ExprError, Result};

/// Convert serde_json::Value to cel_interpreter::Value
pub fn json_to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(b) => CelValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        JsonValue::String(s) => CelValue::String(s.clone().into()),
        JsonValue::Array(arr) => {
            let items: Vec<CelValue> = arr.iter().map(json_to_cel).collect();
            CelValue::List(items.into())
        }
        JsonValue::Object(obj) => {
            use cel_interpreter::objects::{Key, Map};
            use std::collections::HashMap;
            use std::sync::Arc;

            let mut entries: HashMap<Key, CelValue> = HashMap::new();
            for (k, v) in obj.iter() {
                entries.insert(Key::from(k.clone()), json_to_cel(v));
            }
            CelValue::Map(Map {
                map: Arc::new(entries),
            })
        }
    }
}

/// Convert cel_interpreter::Value back to serde_json::Value
///
/// Kinds outside the closed set of supported value kinds (functions,
/// raw bytes without a textual form) are rejected with a type error so
/// callers surface them as evaluation failures rather than panicking.
pub fn cel_to_json(value: &CelValue) -> Result<JsonValue> {
    match value {
        CelValue::Null => Ok(JsonValue::Null),
        CelValue::Bool(b) => Ok(JsonValue::Bool(*b)),
        CelValue::Int(i) => Ok(JsonValue::Number((*i).into())),
        CelValue::UInt(u) => Ok(JsonValue::Number((*u).into())),
        CelValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| ExprError::Type(format!("non-finite float result: {}", f))),
        CelValue::String(s) => Ok(JsonValue::String(s.to_string())),
        CelValue::Bytes(b) => Ok(JsonValue::String(base64::encode(b.as_ref()))),
        CelValue::List(list) => {
            let mut items = Vec::with_capacity(list.len());
            for item in list.iter() {
                items.push(cel_to_json(item)?);
            }
            Ok(JsonValue::Array(items))
        }
        CelValue::Map(map) => {
            use cel_interpreter::objects::Key;

            let mut obj = serde_json::Map::new();
            for (k, v) in map.map.as_ref().iter() {
                let key = match k {
                    Key::String(s) => s.to_string(),
                    Key::Int(i) => i.to_string(),
                    Key::Uint(u) => u.to_string(),
                    Key::Bool(b) => b.to_string(),
                };
                obj.insert(key, cel_to_json(v)?);
            }
            Ok(JsonValue::Object(obj))
        }
        CelValue::Duration(d) => Ok(JsonValue::Number(d.num_milliseconds().into())),
        CelValue::Timestamp(ts) => Ok(JsonValue::String(ts.to_rfc3339())),
        other => Err(ExprError::Type(format!(
            "unsupported result kind: {:?}",
            other
        ))),
    }
}
