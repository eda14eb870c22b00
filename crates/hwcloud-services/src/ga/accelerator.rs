//! `huaweicloud_ga_accelerator`
//!
//! Global accelerators are asynchronous: every mutation is followed by a
//! poll of `accelerator.status`. `ACTIVE` settles the wait, `ERROR` fails
//! it, any other status keeps it pending.

use crate::common::{Tag, check_deleted, expand_tags, flatten_tags, resource_path};
use async_trait::async_trait;
use hwcloud_resource::{
    FieldSpec, OperationContext, ReadOutcome, Refreshed, ResourceAdapter, ResourceData,
    ResourceError, ResourceSchema, ResourceTimeouts, Result, StateChangeConf,
};
use hwcloud_sdk::{RequestBody, RequestOpts, SdkError, ServiceClient};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

pub(crate) const SERVICE: &str = "ga";

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name"),
    FieldSpec::required("ip_sets").force_new(),
    FieldSpec::optional("description").computed(),
    FieldSpec::optional("enterprise_project_id").force_new(),
    FieldSpec::optional("tags"),
];

const MAX_IP_SETS: usize = 2;
const DEFAULT_IP_TYPE: &str = "IPV4";

// Status tokens the refresh function reports
const PENDING: &str = "PENDING";
const COMPLETED: &str = "COMPLETED";

const WAIT_DELAY: Duration = Duration::from_secs(10);
const WAIT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct AcceleratorArgs {
    name: String,
    ip_sets: Vec<IpSetArgs>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    enterprise_project_id: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct IpSetArgs {
    area: String,
    #[serde(default)]
    ip_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct IpSetOpts<'a> {
    area: &'a str,
    ip_type: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateAcceleratorOpts<'a> {
    name: &'a str,
    ip_sets: Vec<IpSetOpts<'a>>,
    description: Option<&'a str>,
    enterprise_project_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<Tag>,
}

impl RequestBody for CreateAcceleratorOpts<'_> {
    const ROOT: Option<&'static str> = Some("accelerator");

    fn validate(&self) -> hwcloud_sdk::Result<()> {
        if self.name.is_empty() {
            return Err(SdkError::MissingRequiredField("name".to_string()));
        }
        if self.ip_sets.iter().any(|set| set.area.is_empty()) {
            return Err(SdkError::MissingRequiredField("ip_sets.area".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct UpdateAcceleratorOpts<'a> {
    name: Option<&'a str>,
    description: Option<&'a str>,
}

impl RequestBody for UpdateAcceleratorOpts<'_> {
    const ROOT: Option<&'static str> = Some("accelerator");
}

/// Accelerator as returned by the GA API
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Accelerator {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub flavor_id: String,
    #[serde(default)]
    pub enterprise_project_id: String,
    #[serde(default)]
    pub ip_sets: Vec<IpSet>,
    #[serde(default)]
    pub frozen_info: Option<FrozenInfo>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct IpSet {
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub ip_type: String,
    #[serde(default)]
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct FrozenInfo {
    #[serde(default)]
    pub effect: Option<i64>,
    #[serde(default)]
    pub scene: Vec<String>,
    #[serde(default)]
    pub status: Option<i64>,
}

impl Accelerator {
    /// Attribute view shared by the resource and the list data source
    pub(crate) fn to_attributes(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "status": self.status,
            "flavor_id": self.flavor_id,
            "enterprise_project_id": self.enterprise_project_id,
            "ip_sets": self.ip_sets,
            "frozen_info": self.frozen_info.iter().collect::<Vec<_>>(),
            "tags": flatten_tags(&self.tags),
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

/// Adapter for GA accelerators
#[derive(Debug, Default)]
pub struct AcceleratorAdapter;

impl AcceleratorAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn accelerator_url(client: &ServiceClient, id: &str) -> Result<String> {
    resource_path(client, "accelerators/{accelerator_id}", &[("accelerator_id", id)])
}

fn tags_url(client: &ServiceClient, id: &str, action: &str) -> Result<String> {
    resource_path(
        client,
        "ga-accelerators/{accelerator_id}/tags/{action}",
        &[("accelerator_id", id), ("action", action)],
    )
}

pub(crate) async fn get_accelerator(
    client: &ServiceClient,
    url: &str,
) -> hwcloud_sdk::Result<Accelerator> {
    client.get(url, RequestOpts::new()).await?.extract("accelerator")
}

async fn refresh_status(
    client: &ServiceClient,
    url: &str,
) -> hwcloud_sdk::Result<Refreshed<()>> {
    match get_accelerator(client, url).await {
        Ok(accelerator) => Ok(Refreshed::state(status_token(&accelerator.status), ())),
        Err(e) if e.is_not_found() => Ok(Refreshed::NotFound),
        Err(e) => Err(e),
    }
}

/// `ACTIVE` maps to the target token; `ERROR` is passed through so the
/// poller rejects it as unexpected.
fn status_token(status: &str) -> &str {
    match status {
        "ACTIVE" => COMPLETED,
        "ERROR" => status,
        _ => PENDING,
    }
}

async fn wait_until_active(
    ctx: &OperationContext,
    client: &ServiceClient,
    id: &str,
    timeout: Duration,
) -> Result<()> {
    let url = accelerator_url(client, id)?;
    let url = url.as_str();
    // A missing accelerator is an error here, not progress
    let conf = ctx.wait_conf(
        StateChangeConf::new(&[PENDING], &[COMPLETED], timeout)
            .delay(WAIT_DELAY)
            .poll_interval(WAIT_INTERVAL)
            .not_found_checks(0),
    );
    conf.wait_for_state(move || refresh_status(client, url))
        .await?;
    Ok(())
}

async fn wait_until_deleted(
    ctx: &OperationContext,
    client: &ServiceClient,
    id: &str,
    timeout: Duration,
) -> Result<()> {
    let url = accelerator_url(client, id)?;
    let url = url.as_str();
    let conf = ctx.wait_conf(
        StateChangeConf::new(&[PENDING], &[COMPLETED], timeout)
            .delay(WAIT_DELAY)
            .poll_interval(WAIT_INTERVAL)
            .absence_is_target(true),
    );
    conf.wait_for_state(move || async move {
        // ACTIVE while deleting is still progress
        Ok::<_, SdkError>(match refresh_status(client, url).await? {
            Refreshed::State { status, value } if status == COMPLETED => {
                Refreshed::state(PENDING, value)
            }
            other => other,
        })
    })
    .await?;
    Ok(())
}

#[async_trait]
impl ResourceAdapter for AcceleratorAdapter {
    fn type_name(&self) -> &'static str {
        "huaweicloud_ga_accelerator"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(FIELDS)
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::uniform(Duration::from_secs(10 * 60))
    }

    async fn create(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        let args: AcceleratorArgs = data.config_as()?;
        if args.ip_sets.is_empty() || args.ip_sets.len() > MAX_IP_SETS {
            return Err(ResourceError::InvalidConfig(format!(
                "ip_sets must contain between 1 and {MAX_IP_SETS} items"
            )));
        }

        let enterprise_project_id = ctx
            .factory()
            .enterprise_project_id(args.enterprise_project_id.as_deref());
        let opts = CreateAcceleratorOpts {
            name: &args.name,
            ip_sets: args
                .ip_sets
                .iter()
                .map(|set| IpSetOpts {
                    area: &set.area,
                    ip_type: set.ip_type.as_deref().unwrap_or(DEFAULT_IP_TYPE),
                })
                .collect(),
            description: args.description.as_deref(),
            enterprise_project_id: enterprise_project_id.as_deref(),
            tags: args
                .tags
                .iter()
                .map(|(key, value)| Tag {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        };

        let client = ctx.client(SERVICE, data).await?;
        let url = client.resource_url(&["accelerators"]);
        let created: Accelerator = client
            .post(&url, RequestOpts::new().body(&opts)?)
            .await?
            .extract("accelerator")?;
        if created.id.is_empty() {
            return Err(ResourceError::operation(
                "create GA accelerator",
                "unable to find the accelerator ID in the API response",
            ));
        }

        data.set_id(&created.id);
        info!(id = %created.id, "GA accelerator created, waiting for it to become active");
        let timeout = ctx.timeouts(self.timeouts()).create;
        wait_until_active(ctx, &client, &created.id, timeout).await
    }

    async fn read(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<ReadOutcome> {
        let id = data.require_id()?.to_string();
        let client = ctx.client(SERVICE, data).await?;
        let url = accelerator_url(&client, &id)?;

        let accelerator = match get_accelerator(&client, &url).await {
            Ok(accelerator) => accelerator,
            Err(e) => return check_deleted(e, data, "GA accelerator"),
        };

        let attributes = accelerator.to_attributes();
        if let Some(map) = attributes.as_object() {
            for (key, value) in map.iter().filter(|(key, _)| key.as_str() != "id") {
                data.set(key, value)?;
            }
        }
        Ok(ReadOutcome::Present)
    }

    async fn update(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let client = ctx.client(SERVICE, data).await?;
        let timeout = ctx.timeouts(self.timeouts()).update;

        if data.has_changes(&["name", "description"]) {
            let opts = UpdateAcceleratorOpts {
                name: data.get_str("name"),
                description: data.get_str("description"),
            };
            let url = accelerator_url(&client, &id)?;
            client.put(&url, RequestOpts::new().body(&opts)?).await?;
            wait_until_active(ctx, &client, &id, timeout).await?;
        }

        if data.has_change("tags") {
            let (old, new) = data.get_change("tags");
            let (old, new) = (expand_tags(old), expand_tags(new));

            if !old.is_empty() {
                let url = tags_url(&client, &id, "delete")?;
                let opts = RequestOpts::new()
                    .json(json!({ "tags": old }))
                    .ok_codes(&[204]);
                client.delete(&url, opts).await?;
                wait_until_active(ctx, &client, &id, timeout).await?;
            }
            if !new.is_empty() {
                let url = tags_url(&client, &id, "create")?;
                let opts = RequestOpts::new()
                    .json(json!({ "tags": new }))
                    .ok_codes(&[204]);
                client.post(&url, opts).await?;
                wait_until_active(ctx, &client, &id, timeout).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let client = ctx.client(SERVICE, data).await?;
        let url = accelerator_url(&client, &id)?;

        client.delete(&url, RequestOpts::new()).await?;
        let timeout = ctx.timeouts(self.timeouts()).delete;
        wait_until_deleted(ctx, &client, &id, timeout).await
    }
}
