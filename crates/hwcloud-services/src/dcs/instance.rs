//! `huaweicloud_dcs_instance`

use crate::common::{check_deleted, resource_path};
use async_trait::async_trait;
use hwcloud_resource::{
    FieldSpec, OperationContext, ReadOutcome, Refreshed, ResourceAdapter, ResourceData,
    ResourceError, ResourceSchema, ResourceTimeouts, Result, StateChangeConf,
};
use hwcloud_sdk::{RequestBody, RequestOpts, SdkError, ServiceClient};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

pub(crate) const SERVICE: &str = "dcs";

const FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("region").force_new().computed(),
    FieldSpec::required("name"),
    FieldSpec::optional("description").computed(),
    FieldSpec::required("engine").force_new(),
    FieldSpec::optional("engine_version").force_new(),
    FieldSpec::required("capacity"),
    FieldSpec::required("flavor").force_new(),
    FieldSpec::required("availability_zones").force_new(),
    FieldSpec::required("vpc_id").force_new(),
    FieldSpec::required("subnet_id").force_new(),
    FieldSpec::optional("security_group_id"),
    FieldSpec::optional("private_ip").force_new().computed(),
    FieldSpec::optional("port").computed(),
    FieldSpec::optional("enterprise_project_id").force_new().computed(),
    FieldSpec::optional("maintain_begin").computed(),
    FieldSpec::optional("maintain_end").computed(),
];

/// Arguments changed through `PUT instances/{id}`
const MODIFIABLE: &[&str] = &[
    "name",
    "description",
    "port",
    "security_group_id",
    "maintain_begin",
    "maintain_end",
];

// Reported by the status fetcher when the instance lookup returns 404
const DELETED: &str = "DELETED";

const WAIT_DELAY: Duration = Duration::from_secs(10);
const WAIT_INTERVAL: Duration = Duration::from_secs(10);
const BUSY_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Error codes of requests rejected because another operation is running
const BUSY_ERROR_CODES: &[&str] = &[
    "DCS.4026",
    "DCS.4049",
    "DCS.4096",
    "DCS.4097",
    "CBC.99003651",
];

#[derive(Debug, Deserialize)]
struct InstanceArgs {
    name: String,
    #[serde(default)]
    description: Option<String>,
    engine: String,
    #[serde(default)]
    engine_version: Option<String>,
    capacity: f64,
    flavor: String,
    availability_zones: Vec<String>,
    vpc_id: String,
    subnet_id: String,
    #[serde(default)]
    security_group_id: Option<String>,
    #[serde(default)]
    private_ip: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    enterprise_project_id: Option<String>,
    #[serde(default)]
    maintain_begin: Option<String>,
    #[serde(default)]
    maintain_end: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateInstanceOpts<'a> {
    name: &'a str,
    description: Option<&'a str>,
    engine: &'a str,
    engine_version: Option<&'a str>,
    capacity: f64,
    spec_code: &'a str,
    az_codes: &'a [String],
    vpc_id: &'a str,
    subnet_id: &'a str,
    security_group_id: Option<&'a str>,
    private_ip: Option<&'a str>,
    port: Option<u16>,
    enterprise_project_id: Option<&'a str>,
    maintain_begin: Option<&'a str>,
    maintain_end: Option<&'a str>,
    no_password_access: bool,
}

impl RequestBody for CreateInstanceOpts<'_> {
    fn validate(&self) -> hwcloud_sdk::Result<()> {
        if self.az_codes.is_empty() {
            return Err(SdkError::MissingRequiredField("az_codes".to_string()));
        }
        Ok(())
    }
}

/// Body of `PUT instances/{id}`. An empty description clears it, so this
/// is sent as is rather than through [`RequestBody`].
#[derive(Debug, Serialize)]
struct ModifyInstanceOpts<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_group_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintain_begin: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintain_end: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ResizeInstanceOpts<'a> {
    spec_code: &'a str,
    new_capacity: f64,
}

impl RequestBody for ResizeInstanceOpts<'_> {}

#[derive(Debug, Deserialize)]
struct CreateInstanceResponse {
    #[serde(default)]
    instances: Vec<CreatedInstance>,
    #[serde(default)]
    instance_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedInstance {
    instance_id: String,
}

impl CreateInstanceResponse {
    fn id(&self) -> Option<&str> {
        self.instances
            .first()
            .map(|i| i.instance_id.as_str())
            .or(self.instance_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Instance as returned by the DCS API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Instance {
    pub instance_id: String,
    pub name: String,
    pub description: String,
    pub engine: String,
    pub engine_version: String,
    pub capacity: f64,
    pub capacity_minor: String,
    pub spec_code: String,
    pub az_codes: Vec<String>,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub ip: String,
    pub port: u16,
    pub status: String,
    pub max_memory: i64,
    pub used_memory: i64,
    pub domain_name: String,
    pub enterprise_project_id: String,
    pub maintain_begin: String,
    pub maintain_end: String,
    pub created_at: String,
    pub launched_at: String,
}

impl Instance {
    /// Capacity in GB; sub-GB instances only report `capacity_minor`
    pub(crate) fn effective_capacity(&self) -> f64 {
        if self.capacity == 0.0 {
            self.capacity_minor.parse().unwrap_or(0.0)
        } else {
            self.capacity
        }
    }

    pub(crate) fn to_attributes(&self, region: &str) -> Value {
        // The API reports this placeholder when no security group is bound
        let security_group_id = match self.security_group_id.as_str() {
            "securityGroupId" => "",
            id => id,
        };
        json!({
            "id": self.instance_id,
            "region": region,
            "name": self.name,
            "description": self.description,
            "engine": self.engine,
            "engine_version": self.engine_version,
            "capacity": self.effective_capacity(),
            "flavor": self.spec_code,
            "availability_zones": self.az_codes,
            "vpc_id": self.vpc_id,
            "subnet_id": self.subnet_id,
            "security_group_id": security_group_id,
            "private_ip": self.ip,
            "port": self.port,
            "status": self.status,
            "max_memory": self.max_memory,
            "used_memory": self.used_memory,
            "domain_name": self.domain_name,
            "enterprise_project_id": self.enterprise_project_id,
            "maintain_begin": self.maintain_begin,
            "maintain_end": self.maintain_end,
            "created_at": self.created_at,
            "launched_at": self.launched_at,
        })
    }
}

/// Adapter for DCS (distributed cache) instances
#[derive(Debug, Default)]
pub struct InstanceAdapter;

impl InstanceAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn instance_url(client: &ServiceClient, id: &str) -> Result<String> {
    resource_path(client, "instances/{instance_id}", &[("instance_id", id)])
}

async fn get_instance(client: &ServiceClient, url: &str) -> hwcloud_sdk::Result<Instance> {
    client.get(url, RequestOpts::new()).await?.json()
}

async fn refresh_status(client: &ServiceClient, url: &str) -> hwcloud_sdk::Result<Refreshed<()>> {
    match get_instance(client, url).await {
        Ok(instance) => Ok(Refreshed::state(instance.status, ())),
        Err(e) if e.is_not_found() => Ok(Refreshed::state(DELETED, ())),
        Err(e) => Err(e),
    }
}

async fn refresh_port(client: &ServiceClient, url: &str) -> hwcloud_sdk::Result<Refreshed<()>> {
    let instance = get_instance(client, url).await?;
    Ok(Refreshed::state(instance.port.to_string(), ()))
}

/// Wait until the instance reports one of `target` twice in a row
async fn wait_for_status(
    ctx: &OperationContext,
    client: &ServiceClient,
    id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<()> {
    let url = instance_url(client, id)?;
    let url = url.as_str();
    let conf = ctx.wait_conf(
        StateChangeConf::new(pending, target, timeout)
            .delay(WAIT_DELAY)
            .poll_interval(WAIT_INTERVAL)
            .continuous_target_occurrence(2),
    );
    conf.wait_for_state(move || refresh_status(client, url))
        .await?;
    Ok(())
}

fn is_busy(err: &SdkError) -> bool {
    matches!(
        err,
        SdkError::BadRequest(detail)
            if detail
                .error_code()
                .is_some_and(|code| BUSY_ERROR_CODES.contains(&code.as_str()))
    )
}

/// Repeat `request` while DCS rejects it because another operation is in
/// progress on the instance.
async fn retry_while_busy<T, F, Fut>(
    ctx: &OperationContext,
    timeout: Duration,
    mut request: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = hwcloud_sdk::Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let interval = ctx.retry_interval(BUSY_RETRY_INTERVAL);
    loop {
        match request().await {
            Err(e) if is_busy(&e) && Instant::now() + interval < deadline => {
                warn!(error = %e, "instance is busy, retrying in {:?}", interval);
                tokio::select! {
                    _ = ctx.cancellation().cancelled() => {
                        return Err(ResourceError::operation(
                            "DCS request",
                            "cancelled while the instance was busy",
                        ));
                    }
                    _ = sleep(interval) => {}
                }
            }
            result => return Ok(result?),
        }
    }
}

#[async_trait]
impl ResourceAdapter for InstanceAdapter {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_instance"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(FIELDS)
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::new(
            Duration::from_secs(120 * 60),
            Duration::from_secs(120 * 60),
            Duration::from_secs(15 * 60),
        )
    }

    async fn create(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        let args: InstanceArgs = data.config_as()?;
        let enterprise_project_id = ctx
            .factory()
            .enterprise_project_id(args.enterprise_project_id.as_deref());
        let opts = CreateInstanceOpts {
            name: &args.name,
            description: args.description.as_deref(),
            engine: &args.engine,
            engine_version: args.engine_version.as_deref(),
            capacity: args.capacity,
            spec_code: &args.flavor,
            az_codes: &args.availability_zones,
            vpc_id: &args.vpc_id,
            subnet_id: &args.subnet_id,
            security_group_id: args.security_group_id.as_deref(),
            private_ip: args.private_ip.as_deref(),
            port: args.port,
            enterprise_project_id: enterprise_project_id.as_deref(),
            maintain_begin: args.maintain_begin.as_deref(),
            maintain_end: args.maintain_end.as_deref(),
            no_password_access: true,
        };

        let client = ctx.client(SERVICE, data).await?;
        let url = client.resource_url(&["instances"]);
        let created: CreateInstanceResponse = client
            .post(&url, RequestOpts::new().body(&opts)?)
            .await?
            .json()?;
        let id = created
            .id()
            .ok_or_else(|| {
                ResourceError::operation(
                    "create DCS instance",
                    "unable to find the instance ID in the API response",
                )
            })?
            .to_string();

        data.set_id(&id);
        info!(id = %id, "DCS instance created, waiting for it to run");
        let timeout = ctx.timeouts(self.timeouts()).create;
        wait_for_status(ctx, &client, &id, &["CREATING"], &["RUNNING"], timeout).await
    }

    async fn read(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<ReadOutcome> {
        let id = data.require_id()?.to_string();
        let region = ctx.region(data);
        let client = ctx.client(SERVICE, data).await?;
        let url = instance_url(&client, &id)?;

        let instance = match get_instance(&client, &url).await {
            Ok(instance) => instance,
            Err(e) => return check_deleted(e, data, "DCS instance"),
        };

        let attributes = instance.to_attributes(&region);
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
        let url = instance_url(&client, &id)?;
        let timeout = ctx.timeouts(self.timeouts()).update;

        if data.has_changes(MODIFIABLE) {
            let opts = ModifyInstanceOpts {
                name: data.get_str("name"),
                description: data
                    .config()
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                port: data.get("port").and_then(Value::as_u64),
                security_group_id: data.get_str("security_group_id"),
                maintain_begin: data.get_str("maintain_begin"),
                maintain_end: data.get_str("maintain_end"),
            };
            let body = serde_json::to_value(&opts)?;
            client
                .put(&url, RequestOpts::new().json(body).ok_codes(&[200, 204]))
                .await?;

            if data.has_change("port") {
                wait_for_port(ctx, &client, &url, data, timeout).await?;
            }
        }

        if data.has_change("capacity") {
            let opts = ResizeInstanceOpts {
                spec_code: data.get_str("flavor").unwrap_or_default(),
                new_capacity: data.get("capacity").and_then(Value::as_f64).ok_or_else(|| {
                    ResourceError::InvalidConfig("capacity must be a number".to_string())
                })?,
            };
            let resize_url = resource_path(
                &client,
                "instances/{instance_id}/resize",
                &[("instance_id", &id)],
            )?;
            let request = RequestOpts::new().body(&opts)?.ok_codes(&[200, 204]);
            retry_while_busy(ctx, timeout, || client.post(&resize_url, request.clone())).await?;

            info!(id = %id, capacity = opts.new_capacity, "DCS instance resizing");
            wait_for_status(
                ctx,
                &client,
                &id,
                &["EXTENDING", "RESTARTING"],
                &["RUNNING"],
                timeout,
            )
            .await?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let client = ctx.client(SERVICE, data).await?;
        let url = instance_url(&client, &id)?;
        let timeout = ctx.timeouts(self.timeouts()).delete;

        match retry_while_busy(ctx, timeout, || client.delete(&url, RequestOpts::new())).await {
            Ok(_) => {}
            Err(ResourceError::Sdk(e)) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }
        wait_for_status(ctx, &client, &id, &["RUNNING"], &[DELETED], timeout).await
    }
}

/// Port changes apply asynchronously; wait until the new port is reported
async fn wait_for_port(
    ctx: &OperationContext,
    client: &ServiceClient,
    url: &str,
    data: &ResourceData,
    timeout: Duration,
) -> Result<()> {
    let port = |v: Option<&Value>| v.and_then(Value::as_u64).map(|p| p.to_string());
    let (old, new) = data.get_change("port");
    let (Some(old), Some(new)) = (port(old), port(new)) else {
        return Ok(());
    };

    let conf = ctx.wait_conf(
        StateChangeConf::new(&[old.as_str()], &[new.as_str()], timeout)
            .delay(WAIT_DELAY)
            .poll_interval(WAIT_INTERVAL),
    );
    conf.wait_for_state(move || refresh_port(client, url))
        .await?;
    Ok(())
}
