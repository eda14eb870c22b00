use anyhow::Context;
use colored::Colorize;
use hwcloud_resource::{ResourceSchema, ResourceState};
use serde_json::{Map, Value};
use std::path::Path;

/// JSON ファイルを読み込む
pub fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("{} を読み込めません", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} は有効な JSON ではありません", path.display()))
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Arguments of `schema` found among `attributes`, used as the
/// configuration of an imported resource
pub fn config_from_attributes(schema: &ResourceSchema, attributes: &Map<String, Value>) -> Value {
    Value::Object(
        attributes
            .iter()
            .filter(|(key, value)| schema.field(key).is_some() && !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

pub fn print_resource(address: &str, state: &ResourceState) {
    println!("{} {}", "■".cyan(), address.bold());
    println!("  id:     {}", state.id.cyan());
    println!("  region: {}", state.region);
    println!("  status: {}", state.status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwcloud_resource::FieldSpec;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_config_from_attributes() {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::required("name"),
            FieldSpec::optional("description"),
        ];
        let schema = ResourceSchema::new(FIELDS);
        let attributes = json!({"name": "acc", "description": null, "status": "ACTIVE"});
        let config = config_from_attributes(&schema, attributes.as_object().unwrap());
        assert_eq!(config, json!({"name": "acc"}));
    }

    #[test]
    fn test_read_json_reports_invalid_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = read_json(file.path()).unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }
}
