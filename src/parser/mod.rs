pub mod baidu;
pub mod bilibili;
pub mod count;
pub mod ximalaya;

use serde_json::Value;

use crate::error::{Error, Result};

// JSON field access with errors that name the missing path. Required
// fields fail the record; callers use the Option variants for cosmetic
// fields that degrade to a sentinel instead.

pub(crate) fn walk<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value> {
    let mut current = value;
    for key in path {
        current = current
            .get(key)
            .ok_or_else(|| Error::parse(format!("missing field '{}'", path.join("."))))?;
    }
    Ok(current)
}

pub(crate) fn str_at(value: &Value, path: &[&str]) -> Result<String> {
    walk(value, path)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::parse(format!("field '{}' is not a string", path.join("."))))
}

pub(crate) fn i64_at(value: &Value, path: &[&str]) -> Result<i64> {
    walk(value, path)?
        .as_i64()
        .ok_or_else(|| Error::parse(format!("field '{}' is not an integer", path.join("."))))
}

pub(crate) fn bool_at(value: &Value, path: &[&str]) -> Result<bool> {
    walk(value, path)?
        .as_bool()
        .ok_or_else(|| Error::parse(format!("field '{}' is not a bool", path.join("."))))
}

pub(crate) fn str_opt(value: &Value, path: &[&str]) -> Option<String> {
    walk(value, path)
        .ok()?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn i64_opt(value: &Value, path: &[&str]) -> Option<i64> {
    walk(value, path).ok()?.as_i64()
}

pub(crate) fn f64_opt(value: &Value, path: &[&str]) -> Option<f64> {
    walk(value, path).ok()?.as_f64()
}
