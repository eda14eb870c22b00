//! Helpers shared by the service adapters

use hwcloud_resource::{ReadOutcome, ResourceData, ResourceError, Result};
use hwcloud_sdk::{SdkError, ServiceClient, expand_path};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Key/value tag in the list form the APIs use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Convert a `tags` argument (an object of strings) into tag list form
pub fn expand_tags(tags: Option<&Value>) -> Vec<Tag> {
    let Some(map) = tags.and_then(Value::as_object) else {
        return Vec::new();
    };
    map.iter()
        .map(|(key, value)| Tag {
            key: key.clone(),
            value: match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            },
        })
        .collect()
}

pub fn flatten_tags(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|tag| (tag.key.clone(), tag.value.clone()))
        .collect()
}

/// Turn a not-found read into [`ReadOutcome::Absent`]; other errors pass
/// through.
pub fn check_deleted(err: SdkError, data: &ResourceData, what: &str) -> Result<ReadOutcome> {
    if err.is_not_found() {
        debug!(id = data.id().unwrap_or_default(), "{what} no longer exists");
        return Ok(ReadOutcome::Absent);
    }
    Err(err.into())
}

/// Split an ID of the form `<a>/<b>/...` into exactly `parts` segments.
/// The last segment keeps any further `/`.
pub fn parse_composite_id<'a>(id: &'a str, parts: usize, format: &str) -> Result<Vec<&'a str>> {
    let segments: Vec<&str> = id.splitn(parts, '/').collect();
    if segments.len() != parts || segments.iter().any(|s| s.is_empty()) {
        return Err(ResourceError::InvalidId {
            id: id.to_string(),
            reason: format!("the format must be {format}"),
        });
    }
    Ok(segments)
}

/// Typed view of data source arguments; `null` means no arguments
pub fn parse_args<T: DeserializeOwned + Default>(args: &Value) -> Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args.clone()).map_err(|e| ResourceError::InvalidConfig(e.to_string()))
}

/// Expand `template` and join it onto the client's resource base
pub fn resource_path(
    client: &ServiceClient,
    template: &str,
    params: &[(&str, &str)],
) -> Result<String> {
    let path = expand_path(template, params)?;
    Ok(client.resource_url(&[&path]))
}
