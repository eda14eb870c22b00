//! `huaweicloud_ga_accelerators` data source

use super::accelerator::{Accelerator, SERVICE};
use crate::common::parse_args;
use async_trait::async_trait;
use hwcloud_resource::{DataSource, OperationContext, Result};
use hwcloud_sdk::{PageStrategy, Pager, QueryParams};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

const PAGE_LIMIT: u32 = 100;

/// Filters, sent to the API as query parameters
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListAcceleratorsArgs {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    enterprise_project_id: Option<String>,
}

impl QueryParams for ListAcceleratorsArgs {}

/// Lists GA accelerators, following `page_info.next_marker`
#[derive(Debug, Default)]
pub struct AcceleratorsDataSource;

impl AcceleratorsDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for AcceleratorsDataSource {
    fn type_name(&self) -> &'static str {
        "huaweicloud_ga_accelerators"
    }

    async fn read(&self, ctx: &OperationContext, args: &Value) -> Result<Value> {
        let args: ListAcceleratorsArgs = parse_args(args)?;
        let client = ctx.default_client(SERVICE).await?;
        let url = client.resource_url(&["accelerators"]);

        let accelerators: Vec<Accelerator> = Pager::new(
            &client,
            url,
            "accelerators",
            PageStrategy::Marker {
                limit: PAGE_LIMIT,
                next_marker_path: Some("page_info.next_marker".to_string()),
            },
        )
        .with_query(args.to_query()?)
        .all_items()
        .await?;

        debug!(count = accelerators.len(), "listed GA accelerators");
        let ids: Vec<&str> = accelerators.iter().map(|a| a.id.as_str()).collect();
        Ok(json!({
            "ids": ids,
            "accelerators": accelerators
                .iter()
                .map(Accelerator::to_attributes)
                .collect::<Vec<_>>(),
        }))
    }
}
