use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::content::Renderable;
use crate::dom::Element;
use crate::error::Result;
use crate::renderer::Renderer;

pub type Object = IndexMap<String, Value>;

type NativeFn = dyn Fn(&Renderer, Vec<Value>) -> Result<Value>;

/// A function callable from templates
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    call: Rc<NativeFn>,
}

impl Function {
    pub fn new(
        name: &str,
        call: impl Fn(&Renderer, Vec<Value>) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name),
            call: Rc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, renderer: &Renderer, args: Vec<Value>) -> Result<Value> {
        (self.call)(renderer, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

/// Dynamic value flowing through template variables and expressions
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Object>),
    Function(Function),
    Element(Element),
    /// Content produced later, resolved during block assembly
    Content(Rc<dyn Renderable>),
}

impl Value {
    pub fn string(value: impl AsRef<str>) -> Self {
        Value::String(Rc::from(value.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn object(entries: Object) -> Self {
        Value::Object(Rc::new(entries))
    }

    pub fn content(renderable: impl Renderable + 'static) -> Self {
        Value::Content(Rc::new(renderable))
    }

    pub fn function(
        name: &str,
        call: impl Fn(&Renderer, Vec<Value>) -> Result<Value> + 'static,
    ) -> Self {
        Value::Function(Function::new(name, call))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Element(_) => "element",
            Value::Content(_) => "content",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(entries) => match entries.get("length") {
                Some(Value::Number(length)) => *length > 0.0,
                _ => !entries.is_empty(),
            },
            Value::Function(_) | Value::Element(_) | Value::Content(_) => true,
        }
    }

    /// `empty` operator: whitespace-only strings and falsy values are empty
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.trim().is_empty(),
            other => !other.is_truthy(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric coercion
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Null => 0.0,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) if items.is_empty() => 0.0,
            Value::Array(items) if items.len() == 1 => items[0].to_number(),
            _ => f64::NAN,
        }
    }

    /// Property access: object keys, array indices and `length`
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(entries) => entries.get(key).cloned().unwrap_or_default(),
            Value::Array(items) => {
                if key == "length" {
                    Value::Number(items.len() as f64)
                } else {
                    key.parse::<usize>()
                        .ok()
                        .and_then(|index| items.get(index).cloned())
                        .unwrap_or_default()
                }
            }
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            Value::Element(element) => element
                .get_attribute(key)
                .map(Value::string)
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Value {
        let mut current = self.clone();
        for segment in path {
            current = current.get(segment.as_ref());
            if current.is_nullish() {
                return Value::Undefined;
            }
        }
        current
    }

    /// Own keys of an array (its indices) or an object
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Array(items) => (0..items.len()).map(|index| index.to_string()).collect(),
            Value::Object(entries) => entries.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .filter(|(_, value)| !matches!(value, Value::Undefined | Value::Function(_)))
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Element(element) => serde_json::Value::String(element.outer_html()),
            Value::Function(_) | Value::Content(_) => serde_json::Value::Null,
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => write!(f, "{}", self.to_json()),
            Value::Function(function) => write!(f, "[function {}]", function.name()),
            Value::Element(element) => write!(f, "{}", element.outer_html()),
            Value::Content(_) => write!(f, "[content]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(entries) => f.debug_map().entries(entries.iter()).finish(),
            Value::Function(function) => write!(f, "{:?}", function),
            other => write!(f, "{}", other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(None)?;
                for (key, value) in entries.iter() {
                    if !matches!(value, Value::Undefined | Value::Function(_)) {
                        map.serialize_entry(key, value)?;
                    }
                }
                map.end()
            }
            other => other.to_json().serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Object> for Value {
    fn from(entries: Object) -> Self {
        Value::object(entries)
    }
}

impl From<Element> for Value {
    fn from(element: Element) -> Self {
        Value::Element(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("0").is_truthy());
        assert!(!Value::from(json!([])).is_truthy());
        assert!(Value::from(json!([0])).is_truthy());
        assert!(!Value::from(json!({})).is_truthy());
        assert!(Value::from(json!({"a": null})).is_truthy());
        assert!(!Value::from(json!({"length": 0})).is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_path_access() {
        let value = Value::from(json!({"two": {"three": {"four": 4}}, "list": [1, 2]}));
        assert_eq!(value.get_path(&["two", "three", "four"]).to_number(), 4.0);
        assert_eq!(value.get_path(&["list", "length"]).to_number(), 2.0);
        assert!(value.get_path(&["nope", "nope"]).is_nullish());
    }

    #[test]
    fn test_serialize_keeps_order() {
        let value = Value::from(json!({"b": 1, "a": [true, null]}));
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"b":1,"a":[true,null]}"#);
    }
}
