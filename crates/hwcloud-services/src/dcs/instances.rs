//! `huaweicloud_dcs_instances` data source

use super::instance::{Instance, SERVICE};
use crate::common::parse_args;
use async_trait::async_trait;
use hwcloud_resource::{DataSource, OperationContext, Result};
use hwcloud_sdk::{PageStrategy, Pager, QueryParams};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListInstancesArgs {
    #[serde(default, skip_serializing)]
    region: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl QueryParams for ListInstancesArgs {}

/// Lists DCS instances with offset pagination
#[derive(Debug, Default)]
pub struct InstancesDataSource;

impl InstancesDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for InstancesDataSource {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_instances"
    }

    async fn read(&self, ctx: &OperationContext, args: &Value) -> Result<Value> {
        let args: ListInstancesArgs = parse_args(args)?;
        let region = ctx.region_or(args.region.as_deref());
        let client = ctx.client_in(SERVICE, Some(&region)).await?;
        let url = client.resource_url(&["instances"]);

        let instances: Vec<Instance> = Pager::new(
            &client,
            url,
            "instances",
            PageStrategy::Offset {
                limit: PAGE_LIMIT,
                start: 0,
            },
        )
        .with_query(args.to_query()?)
        .all_items()
        .await?;

        debug!(count = instances.len(), region = %region, "listed DCS instances");
        let ids: Vec<&str> = instances.iter().map(|i| i.instance_id.as_str()).collect();
        Ok(json!({
            "region": region,
            "ids": ids,
            "instances": instances
                .iter()
                .map(|instance| instance.to_attributes(&region))
                .collect::<Vec<_>>(),
        }))
    }
}
