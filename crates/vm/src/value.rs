//! The VM's runtime value model (§3 Glossary: "VM Value"): a tagged
//! variant over `{void, null, bool, int64, float64, string, object,
//! array}` with structural equality and script-style truthiness.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(Arc<ObjectValue>),
    Array(Arc<ArrayValue>),
}

/// `(type_name, field_map)`. Fields are mutated in place by `SETFIELD`;
/// a missing field reads as `Value::Null` rather than erroring.
#[derive(Debug)]
pub struct ObjectValue {
    pub type_name: String,
    fields: Mutex<indexmap::IndexMap<String, Value>>,
}

impl ObjectValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Mutex::new(indexmap::IndexMap::new()),
        }
    }

    pub fn get(&self, field: &str) -> Value {
        self.fields.lock().get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&self, field: impl Into<String>, value: Value) {
        self.fields.lock().insert(field.into(), value);
    }
}

/// Size-fixed on creation (`NEWARRAY`); elements are bounds-checked reads
/// and writes.
#[derive(Debug)]
pub struct ArrayValue {
    elements: Mutex<Vec<Value>>,
}

impl ArrayValue {
    pub fn new(len: usize) -> Self {
        Self {
            elements: Mutex::new(vec![Value::Null; len]),
        }
    }

    pub fn from_vec(values: Vec<Value>) -> Self {
        Self {
            elements: Mutex::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.elements.lock().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut guard = self.elements.lock();
        match guard.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int64",
            Value::Float(_) => "float64",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// Mirrors common script-language truthiness: `void`/`null`/`false`
    /// and zero-valued/empty scalars are falsy, references are always
    /// truthy (§3 Glossary).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Void | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    /// Bridges to the bus's JSON-encoded message bodies for the `EB*`
    /// opcodes (§4.5).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Void | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Array(a) => {
                serde_json::Value::Array(a.elements.lock().iter().map(Value::to_json).collect())
            }
            Value::Object(o) => {
                let mut map = serde_json::Map::new();
                for (k, v) in o.fields.lock().iter() {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::Str(Arc::from(s.as_str())),
            serde_json::Value::Array(items) => Value::Array(Arc::new(ArrayValue::from_vec(
                items.into_iter().map(Value::from_json).collect(),
            ))),
            serde_json::Value::Object(map) => {
                let object = ObjectValue::new("json");
                for (k, v) in map {
                    object.set(k, Value::from_json(v));
                }
                Value::Object(Arc::new(object))
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Arc::ptr_eq(a, b) || *a.elements.lock() == *b.elements.lock()
            }
            (Value::Object(a), Value::Object(b)) => {
                Arc::ptr_eq(a, b) || (a.type_name == b.type_name && *a.fields.lock() == *b.fields.lock())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "<void>"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(a) => write!(f, "[array len={}]", a.len()),
            Value::Object(o) => write!(f, "[object {}]", o.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_script_semantics() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Str(Arc::from("")).is_truthy());
        assert!(Value::Str(Arc::from("x")).is_truthy());
    }

    #[test]
    fn object_missing_field_reads_as_null() {
        let object = ObjectValue::new("Point");
        assert_eq!(object.get("x"), Value::Null);
        object.set("x", Value::Int(1));
        assert_eq!(object.get("x"), Value::Int(1));
    }

    #[test]
    fn array_out_of_bounds_set_fails() {
        let array = ArrayValue::new(2);
        assert!(array.set(1, Value::Int(9)));
        assert!(!array.set(2, Value::Int(9)));
    }

    #[test]
    fn json_roundtrip_preserves_structure() {
        let json = serde_json::json!({"a": 1, "b": [true, null, "x"]});
        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }
}
