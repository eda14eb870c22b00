use crate::{Runtime, utils};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

pub async fn handle(runtime: &Runtime, data_source: &str, file: Option<&Path>) -> anyhow::Result<()> {
    let source = runtime.registry.data_source(data_source)?;
    let args = match file {
        Some(file) => utils::read_json(file)?,
        None => Value::Object(Map::new()),
    };

    debug!(data_source, "reading data source");
    let result = source.read(&runtime.ctx, &args).await?;
    utils::print_json(&result)
}
