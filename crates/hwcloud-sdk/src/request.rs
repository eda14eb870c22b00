//! Request bodies, query strings and path templates

use crate::error::{Result, SdkError};
use serde::Serialize;
use serde_json::{Map, Value};

/// A JSON request body.
///
/// `to_body` validates the value, drops `null` fields and empty strings, and
/// wraps the result under [`RequestBody::ROOT`] when the API expects an
/// envelope such as `{"accelerator": {...}}`.
pub trait RequestBody: Serialize {
    const ROOT: Option<&'static str> = None;

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn to_body(&self) -> Result<Value> {
        self.validate()?;
        let mut value = serde_json::to_value(self)?;
        prune(&mut value);
        Ok(match Self::ROOT {
            Some(root) => {
                let mut envelope = Map::new();
                envelope.insert(root.to_string(), value);
                Value::Object(envelope)
            }
            None => value,
        })
    }
}

/// Query string parameters
pub trait QueryParams: Serialize {
    /// Flatten into key/value pairs. `null` and empty strings are skipped,
    /// arrays repeat their key once per element.
    fn to_query(&self) -> Result<Vec<(String, String)>> {
        let map = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            Value::Null => return Ok(Vec::new()),
            other => {
                return Err(SdkError::InvalidQuery(format!(
                    "expected an object, got {other}"
                )));
            }
        };

        let mut pairs = Vec::new();
        for (key, value) in map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        if let Some(s) = scalar(item) {
                            pairs.push((key.clone(), s));
                        }
                    }
                }
                other => {
                    if let Some(s) = scalar(other) {
                        pairs.push((key, s));
                    }
                }
            }
        }
        Ok(pairs)
    }

    /// Append the parameters to `url`
    fn apply_to(&self, url: &str) -> Result<String> {
        let mut parsed =
            reqwest::Url::parse(url).map_err(|e| SdkError::InvalidUrl(format!("{url}: {e}")))?;
        let pairs = self.to_query()?;
        if !pairs.is_empty() {
            parsed.query_pairs_mut().extend_pairs(pairs.iter());
        }
        Ok(parsed.to_string())
    }
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Remove `null` values and empty strings from every object, recursively
fn prune(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null() && v.as_str() != Some(""));
            map.values_mut().for_each(prune);
        }
        Value::Array(items) => items.iter_mut().for_each(prune),
        _ => {}
    }
}

/// Substitute `{name}` placeholders in `template`.
///
/// Every placeholder must have a non-empty value; values may not contain
/// `/`, `?` or `#`.
pub fn expand_path(template: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| SdkError::InvalidUrl(format!("unclosed placeholder in {template}")))?;
        let name = &after[..close];

        let value = params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SdkError::MissingPathParam(name.to_string()))?;
        if value.contains(['/', '?', '#']) {
            return Err(SdkError::InvalidPathParam {
                name: name.to_string(),
                value: value.to_string(),
            });
        }

        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Presence check for a required input
pub fn require<T>(field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| SdkError::MissingRequiredField(field.to_string()))
}

/// Presence check for a required string input; empty counts as missing
pub fn require_str<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    require(field, value.filter(|v| !v.is_empty()))
}
