//! Typed decoding of the persisted JSON files.
//!
//! A failed decode reports the path of the first offending value
//! (`expenses[1].amount`, `tags[0]`, `launches`) together with the reason, so
//! callers can show the user exactly what is wrong with their file.

use crate::{DataIssue, Expense, UserConfig, UserData};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const REQUIRED_EXPENSE_FIELDS: [&str; 3] = ["amount", "name", "category"];

pub fn decode_user_data(bytes: &[u8]) -> Result<UserData, DataIssue> {
    let map = parse_object(bytes)?;

    let expenses = match map.get("expenses") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| decode_expense(&format!("expenses[{i}]"), item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(mismatch("expenses", "an array", other)),
    };

    Ok(UserData {
        expenses,
        names: optional_string_set(&map, "names")?,
        categories: optional_string_set(&map, "categories")?,
        tags: optional_string_set(&map, "tags")?,
    })
}

pub fn decode_user_config(bytes: &[u8]) -> Result<UserConfig, DataIssue> {
    let map = parse_object(bytes)?;
    for key in ["username", "launches", "data_size"] {
        if !map.contains_key(key) {
            return Err(DataIssue::at(key, "missing required field"));
        }
    }
    check_field::<String>(&map, "username", "")?;
    check_field::<u64>(&map, "launches", "")?;
    check_field::<String>(&map, "data_size", "")?;
    serde_json::from_value(Value::Object(map)).map_err(|e| DataIssue::document(e.to_string()))
}

fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>, DataIssue> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DataIssue::document(format!("malformed JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DataIssue::document(format!(
            "expected an object at the top level, found {}",
            kind(&other)
        ))),
    }
}

fn decode_expense(path: &str, value: &Value) -> Result<Expense, DataIssue> {
    let Value::Object(obj) = value else {
        return Err(mismatch(path, "an object", value));
    };
    for key in REQUIRED_EXPENSE_FIELDS {
        if !obj.contains_key(key) {
            return Err(DataIssue::at(
                format!("{path}.{key}"),
                "missing required field",
            ));
        }
    }
    check_field::<crate::Amount>(obj, "amount", path)?;
    check_field::<String>(obj, "name", path)?;
    check_field::<String>(obj, "category", path)?;
    if let Some(tags) = obj.get("tags") {
        string_set(&format!("{path}.tags"), tags)?;
    }
    check_field::<Option<chrono::NaiveDateTime>>(obj, "occurred_at", path)?;
    check_field::<Option<String>>(obj, "description", path)?;
    check_field::<Option<String>>(obj, "notes", path)?;

    serde_json::from_value(value.clone()).map_err(|e| DataIssue::at(path, e.to_string()))
}

fn check_field<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<(), DataIssue> {
    let Some(v) = obj.get(key) else {
        return Ok(());
    };
    serde_json::from_value::<T>(v.clone()).map(|_| ()).map_err(|e| {
        let field = if parent.is_empty() {
            key.to_string()
        } else {
            format!("{parent}.{key}")
        };
        DataIssue::at(field, e.to_string())
    })
}

fn optional_string_set(
    map: &Map<String, Value>,
    key: &str,
) -> Result<BTreeSet<String>, DataIssue> {
    match map.get(key) {
        None => Ok(BTreeSet::new()),
        Some(v) => string_set(key, v),
    }
}

fn string_set(path: &str, value: &Value) -> Result<BTreeSet<String>, DataIssue> {
    let Value::Array(items) = value else {
        return Err(mismatch(path, "an array of strings", value));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(mismatch(&format!("{path}[{i}]"), "a string", other)),
        })
        .collect()
}

fn mismatch(path: &str, expected: &str, found: &Value) -> DataIssue {
    DataIssue::at(path, format!("expected {expected}, found {}", kind(found)))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
