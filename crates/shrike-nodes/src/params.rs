//! Small helpers for reading operator params out of free-form JSON.

use crate::Error;

pub(crate) fn int_or(params: &serde_json::Value, name: &str, default: i64) -> i64 {
    params
        .get(name)
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(default)
}

pub(crate) fn str_or<'a>(
    params: &'a serde_json::Value,
    name: &str,
    default: &'a str,
) -> &'a str {
    params
        .get(name)
        .and_then(serde_json::Value::as_str)
        .unwrap_or(default)
}

pub(crate) fn key_id_list(
    params: &serde_json::Value,
    op: &'static str,
    name: &'static str,
) -> error_stack::Result<Vec<i32>, Error> {
    let Some(value) = params.get(name) else {
        return Ok(Vec::new());
    };
    let items = value.as_array().ok_or_else(|| {
        error_stack::Report::new(Error::InvalidParam {
            op,
            param: name,
            reason: "expected an array of key ids".to_owned(),
        })
    })?;
    items
        .iter()
        .map(|item| {
            item.as_i64().map(|id| id as i32).ok_or_else(|| {
                error_stack::Report::new(Error::InvalidParam {
                    op,
                    param: name,
                    reason: format!("expected an integer key id, got {item}"),
                })
            })
        })
        .collect()
}
