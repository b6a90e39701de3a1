//! Global functions available to every template.

use crate::error::Error;
use crate::value::{Object, Value};

fn first(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_default()
}

fn numbers(args: &[Value]) -> impl Iterator<Item = f64> + '_ {
    args.iter().map(Value::to_number)
}

fn math() -> Object {
    let mut math = Object::new();
    math.insert(
        "max".into(),
        Value::function("Math.max", |_, args| {
            Ok(Value::Number(numbers(&args).fold(f64::NEG_INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
            })))
        }),
    );
    math.insert(
        "min".into(),
        Value::function("Math.min", |_, args| {
            Ok(Value::Number(numbers(&args).fold(f64::INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
            })))
        }),
    );
    math.insert(
        "floor".into(),
        Value::function("Math.floor", |_, args| Ok(Value::Number(first(&args).to_number().floor()))),
    );
    math.insert(
        "ceil".into(),
        Value::function("Math.ceil", |_, args| Ok(Value::Number(first(&args).to_number().ceil()))),
    );
    math.insert(
        "round".into(),
        Value::function("Math.round", |_, args| {
            Ok(Value::Number((first(&args).to_number() + 0.5).floor()))
        }),
    );
    math.insert(
        "abs".into(),
        Value::function("Math.abs", |_, args| Ok(Value::Number(first(&args).to_number().abs()))),
    );
    math
}

fn json() -> Object {
    let mut json = Object::new();
    json.insert(
        "stringify".into(),
        Value::function("JSON.stringify", |_, args| {
            let value = first(&args);
            if matches!(value, Value::Undefined | Value::Function(_)) {
                return Ok(Value::Undefined);
            }
            serde_json::to_string(&value)
                .map(Value::string)
                .map_err(|err| Error::runtime(format!("JSON.stringify failed: {}", err)))
        }),
    );
    json.insert(
        "parse".into(),
        Value::function("JSON.parse", |_, args| {
            let text = first(&args).to_string();
            serde_json::from_str::<serde_json::Value>(&text)
                .map(Value::from)
                .map_err(|err| Error::runtime(format!("JSON.parse failed: {}", err)))
        }),
    );
    json
}

/// Build the table of global built-ins
pub fn globals() -> Object {
    let mut globals = Object::new();
    globals.insert(
        "String".into(),
        Value::function("String", |_, args| Ok(Value::string(first(&args).to_string()))),
    );
    globals.insert(
        "Number".into(),
        Value::function("Number", |_, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
        }),
    );
    globals.insert(
        "Boolean".into(),
        Value::function("Boolean", |_, args| Ok(Value::Bool(first(&args).is_truthy()))),
    );
    globals.insert("Math".into(), Value::object(math()));
    globals.insert("JSON".into(), Value::object(json()));
    globals
}
