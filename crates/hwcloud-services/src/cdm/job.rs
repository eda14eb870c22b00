//! `huaweicloud_cdm_job`
//!
//! The job is identified by `<cluster_id>/<job_name>`. Creating or updating
//! a job also starts it and waits until it runs.

use crate::common::{check_deleted, parse_composite_id, resource_path};
use async_trait::async_trait;
use hwcloud_resource::{
    FieldSpec, OperationContext, ReadOutcome, Refreshed, ResourceAdapter, ResourceData,
    ResourceError, ResourceSchema, ResourceTimeouts, Result, StateChangeConf,
};
use hwcloud_sdk::{RequestBody, RequestOpts, SdkError, ServiceClient};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "cdm";
const ID_FORMAT: &str = "<cluster_id>/<job_name>";

const FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("region").force_new().computed(),
    // part of the ID
    FieldSpec::required("name").force_new(),
    FieldSpec::required("cluster_id").force_new(),
    FieldSpec::required("job_type").force_new(),
    FieldSpec::required("source_connector").force_new(),
    FieldSpec::required("source_link_name").force_new(),
    FieldSpec::required("source_job_config"),
    FieldSpec::required("destination_connector").force_new(),
    FieldSpec::required("destination_link_name").force_new(),
    FieldSpec::required("destination_job_config"),
    FieldSpec::optional("config"),
];

const JOB_TYPES: &[&str] = &["NORMAL_JOB", "BATCH_JOB", "SCENARIO_JOB"];

/// CDM answers lookups of missing jobs with a 400 and one of these codes
const NOT_FOUND_CODES: &[&str] = &["Cdm.0100", "Cdm.0054"];

const FAILED_SUBMISSIONS: &[&str] = &["FAILURE_ON_SUBMIT", "FAILED", "NEVER_EXECUTED"];
const ACTIVE_STATUSES: &[&str] = &["BOOTING", "RUNNING"];

const FROM_JOB_CONFIG: &str = "fromJobConfig";
const TO_JOB_CONFIG: &str = "toJobConfig";

const WAIT_DELAY: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Int,
    Bool,
    Text,
    /// Returned URL encoded by the API
    Encoded,
}

/// One driver config input and the `config` key it maps to
struct DriverInput {
    group: &'static str,
    input: &'static str,
    key: &'static str,
    kind: InputKind,
}

const fn input(
    group: &'static str,
    input: &'static str,
    key: &'static str,
    kind: InputKind,
) -> DriverInput {
    DriverInput {
        group,
        input,
        key,
        kind,
    }
}

const THROTTLING: &str = "throttlingConfig";
const SCHEDULER: &str = "schedulerConfig";

#[rustfmt::skip]
const DRIVER_INPUTS: &[DriverInput] = &[
    input(THROTTLING, "throttlingConfig.numExtractors", "throttling_extractors_number", InputKind::Int),
    input(THROTTLING, "throttlingConfig.numLoaders", "throttling_loader_number", InputKind::Int),
    input(THROTTLING, "throttlingConfig.recordDirtyData", "throttling_record_dirty_data", InputKind::Bool),
    input(THROTTLING, "throttlingConfig.writeToLink", "throttling_dirty_write_to_link", InputKind::Text),
    input(THROTTLING, "throttlingConfig.obsBucket", "throttling_dirty_write_to_bucket", InputKind::Text),
    input(THROTTLING, "throttlingConfig.dirtyDataDirectory", "throttling_dirty_write_to_directory", InputKind::Encoded),
    input(THROTTLING, "throttlingConfig.maxErrorRecords", "throttling_max_error_records", InputKind::Int),
    input(SCHEDULER, "schedulerConfig.isSchedulerJob", "scheduler_enabled", InputKind::Bool),
    input(SCHEDULER, "schedulerConfig.cycleType", "scheduler_cycle_type", InputKind::Text),
    input(SCHEDULER, "schedulerConfig.cycle", "scheduler_cycle", InputKind::Int),
    input(SCHEDULER, "schedulerConfig.runAt", "scheduler_run_at", InputKind::Text),
    input(SCHEDULER, "schedulerConfig.startDate", "scheduler_start_date", InputKind::Encoded),
    input(SCHEDULER, "schedulerConfig.stopDate", "scheduler_stop_date", InputKind::Encoded),
    input(SCHEDULER, "schedulerConfig.disposableType", "scheduler_disposable_type", InputKind::Text),
    input("retryJobConfig", "retryJobConfig.retryJobType", "retry_type", InputKind::Text),
    input("groupJobConfig", "groupJobConfig.groupName", "group_name", InputKind::Text),
];

/// Defaults applied when a `config` block is given
const CONFIG_DEFAULTS: &[(&str, &str)] = &[
    ("throttling_extractors_number", "1"),
    ("group_name", "DEFAULT"),
    ("retry_type", "NONE"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Input {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ConfigGroup {
    name: String,
    #[serde(default)]
    inputs: Vec<Input>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ConfigValues {
    #[serde(default)]
    configs: Vec<ConfigGroup>,
}

#[derive(Debug, Serialize)]
struct JobOpts<'a> {
    job_type: &'a str,
    name: &'a str,
    #[serde(rename = "from-link-name")]
    from_link_name: &'a str,
    #[serde(rename = "from-connector-name")]
    from_connector_name: &'a str,
    #[serde(rename = "from-config-values")]
    from_config_values: ConfigValues,
    #[serde(rename = "to-link-name")]
    to_link_name: &'a str,
    #[serde(rename = "to-connector-name")]
    to_connector_name: &'a str,
    #[serde(rename = "to-config-values")]
    to_config_values: ConfigValues,
    #[serde(rename = "driver-config-values")]
    driver_config_values: ConfigValues,
}

#[derive(Debug, Serialize)]
struct JobsOpts<'a> {
    jobs: Vec<JobOpts<'a>>,
}

impl RequestBody for JobsOpts<'_> {
    fn validate(&self) -> hwcloud_sdk::Result<()> {
        for job in &self.jobs {
            if !JOB_TYPES.contains(&job.job_type) {
                return Err(SdkError::MissingRequiredField(format!(
                    "job_type (one of {})",
                    JOB_TYPES.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Job {
    name: String,
    job_type: String,
    #[serde(rename = "from-link-name")]
    from_link_name: String,
    #[serde(rename = "from-connector-name")]
    from_connector_name: String,
    #[serde(rename = "from-config-values")]
    from_config_values: ConfigValues,
    #[serde(rename = "to-link-name")]
    to_link_name: String,
    #[serde(rename = "to-connector-name")]
    to_connector_name: String,
    #[serde(rename = "to-config-values")]
    to_config_values: ConfigValues,
    #[serde(rename = "driver-config-values")]
    driver_config_values: ConfigValues,
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct StartJobResponse {
    #[serde(default)]
    submissions: Vec<Submission>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Submission {
    status: String,
    progress: f64,
}

/// Adapter for CDM (Cloud Data Migration) jobs
#[derive(Debug, Default)]
pub struct JobAdapter;

impl JobAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Request paths of one job
struct JobPaths {
    cluster_id: String,
    job_name: String,
}

impl JobPaths {
    fn from_id(id: &str) -> Result<Self> {
        let parts = parse_composite_id(id, 2, ID_FORMAT)?;
        Ok(Self {
            cluster_id: parts[0].to_string(),
            job_name: parts[1].to_string(),
        })
    }

    fn id(&self) -> String {
        format!("{}/{}", self.cluster_id, self.job_name)
    }

    fn collection(&self, client: &ServiceClient) -> Result<String> {
        resource_path(
            client,
            "clusters/{cluster_id}/cdm/job",
            &[("cluster_id", &self.cluster_id)],
        )
    }

    fn job(&self, client: &ServiceClient) -> Result<String> {
        self.action(client, "")
    }

    fn action(&self, client: &ServiceClient, action: &str) -> Result<String> {
        let url = resource_path(
            client,
            "clusters/{cluster_id}/cdm/job/{job_name}",
            &[("cluster_id", &self.cluster_id), ("job_name", &self.job_name)],
        )?;
        Ok(match action {
            "" => url,
            action => format!("{url}/{action}"),
        })
    }
}

async fn get_job(client: &ServiceClient, url: &str) -> hwcloud_sdk::Result<Option<Job>> {
    let list: JobList = client
        .get(url, RequestOpts::new())
        .await
        .map_err(|e| e.not_found_on_codes(NOT_FOUND_CODES))?
        .json()?;
    Ok(list.jobs.into_iter().next())
}

async fn refresh_status(client: &ServiceClient, url: &str) -> hwcloud_sdk::Result<Refreshed<()>> {
    match get_job(client, url).await {
        Ok(Some(job)) => Ok(Refreshed::state(job.status, ())),
        Ok(None) => Ok(Refreshed::NotFound),
        Err(e) if e.is_not_found() => Ok(Refreshed::NotFound),
        Err(e) => Err(e),
    }
}

/// Start the job, then wait until it is running or has already succeeded
async fn start_and_wait(
    ctx: &OperationContext,
    client: &ServiceClient,
    paths: &JobPaths,
    timeout: Duration,
) -> Result<()> {
    let started: StartJobResponse = client
        .put(&paths.action(client, "start")?, RequestOpts::new())
        .await?
        .json()?;
    let submission = started.submissions.first().ok_or_else(|| {
        ResourceError::operation("start CDM job", "the response carries no submission")
    })?;
    if FAILED_SUBMISSIONS.contains(&submission.status.as_str()) {
        return Err(ResourceError::operation(
            "start CDM job",
            format!(
                "submission {} at progress {}",
                submission.status, submission.progress
            ),
        ));
    }

    let url = paths.job(client)?;
    let url = url.as_str();
    // FAILED and FAILURE_ON_SUBMIT are neither pending nor target, so the
    // wait rejects them
    let conf = ctx.wait_conf(
        StateChangeConf::new(&["BOOTING"], &["RUNNING", "SUCCEEDED"], timeout).delay(WAIT_DELAY),
    );
    conf.wait_for_state(move || refresh_status(client, url))
        .await?;
    Ok(())
}

/// Stop the job when it is booting or running
async fn stop_if_active(client: &ServiceClient, paths: &JobPaths, job: &Job) -> Result<()> {
    if ACTIVE_STATUSES.contains(&job.status.as_str()) {
        debug!(id = %paths.id(), status = %job.status, "stopping CDM job");
        client
            .put(&paths.action(client, "stop")?, RequestOpts::new())
            .await?;
    }
    Ok(())
}

/// `fromJobConfig`/`toJobConfig` groups from a string map argument
fn job_config(data: &ResourceData, key: &str, group: &str) -> Result<ConfigValues> {
    let map = data
        .config()
        .get(key)
        .and_then(Value::as_object)
        .filter(|map| !map.is_empty())
        .ok_or_else(|| ResourceError::MissingField(key.to_string()))?;

    let inputs = map
        .iter()
        .map(|(name, value)| Input {
            name: format!("{group}.{name}"),
            value: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
        .collect();
    Ok(ConfigValues {
        configs: vec![ConfigGroup {
            name: group.to_string(),
            inputs,
        }],
    })
}

/// Render a `config` value the way the API expects it. Zero values count
/// as unset.
fn render(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Driver config groups from the optional `config` argument
fn driver_config(config: Option<&Value>) -> ConfigValues {
    let Some(config) = config.and_then(Value::as_object) else {
        return ConfigValues::default();
    };
    let lookup = |key: &str| {
        config.get(key).and_then(render).or_else(|| {
            CONFIG_DEFAULTS
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    };
    let scheduler_enabled = lookup("scheduler_enabled").as_deref() == Some("true");

    let mut groups: Vec<ConfigGroup> = Vec::new();
    for entry in DRIVER_INPUTS {
        if entry.group == SCHEDULER && !scheduler_enabled {
            continue;
        }
        let Some(value) = lookup(entry.key) else {
            continue;
        };
        let item = Input {
            name: entry.input.to_string(),
            value,
        };
        match groups.iter_mut().find(|g| g.name == entry.group) {
            Some(group) => group.inputs.push(item),
            None => groups.push(ConfigGroup {
                name: entry.group.to_string(),
                inputs: vec![item],
            }),
        }
    }
    ConfigValues { configs: groups }
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Inverse of [`job_config`]: strip the group prefix and decode the values
fn flatten_job_config(group: &str, values: &ConfigValues) -> Map<String, Value> {
    let prefix = format!("{group}.");
    values
        .configs
        .iter()
        .filter(|g| g.name == group)
        .flat_map(|g| g.inputs.iter())
        .filter(|input| !input.value.is_empty())
        .map(|input| {
            let key = input.name.replacen(&prefix, "", 1);
            (key, Value::String(decode(&input.value)))
        })
        .collect()
}

/// Inverse of [`driver_config`]
fn flatten_driver_config(values: &ConfigValues) -> Result<Map<String, Value>> {
    let mut result = Map::new();
    let inputs = values.configs.iter().flat_map(|g| g.inputs.iter());
    for item in inputs.filter(|i| !i.value.is_empty()) {
        let Some(entry) = DRIVER_INPUTS.iter().find(|e| e.input == item.name) else {
            continue;
        };
        let invalid = || {
            ResourceError::operation(
                "read CDM job",
                format!("invalid value {:?} for {}", item.value, item.name),
            )
        };
        let value = match entry.kind {
            InputKind::Int => json!(item.value.parse::<i64>().map_err(|_| invalid())?),
            InputKind::Bool => json!(item.value.parse::<bool>().map_err(|_| invalid())?),
            InputKind::Text => json!(item.value),
            InputKind::Encoded => json!(decode(&item.value)),
        };
        result.insert(entry.key.to_string(), value);
    }
    Ok(result)
}

fn job_opts<'a>(
    data: &'a ResourceData,
    name: &'a str,
) -> Result<JobsOpts<'a>> {
    let get = |key: &str| {
        data.get_str(key)
            .ok_or_else(|| ResourceError::MissingField(key.to_string()))
    };
    Ok(JobsOpts {
        jobs: vec![JobOpts {
            job_type: get("job_type")?,
            name,
            from_link_name: get("source_link_name")?,
            from_connector_name: get("source_connector")?,
            from_config_values: job_config(data, "source_job_config", FROM_JOB_CONFIG)?,
            to_link_name: get("destination_link_name")?,
            to_connector_name: get("destination_connector")?,
            to_config_values: job_config(data, "destination_job_config", TO_JOB_CONFIG)?,
            driver_config_values: driver_config(data.config().get("config")),
        }],
    })
}

#[async_trait]
impl ResourceAdapter for JobAdapter {
    fn type_name(&self) -> &'static str {
        "huaweicloud_cdm_job"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(FIELDS)
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::uniform(Duration::from_secs(20 * 60))
    }

    async fn create(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        let name = data
            .get_str("name")
            .ok_or_else(|| ResourceError::MissingField("name".to_string()))?
            .to_string();
        let cluster_id = data
            .get_str("cluster_id")
            .ok_or_else(|| ResourceError::MissingField("cluster_id".to_string()))?
            .to_string();
        let opts = job_opts(data, &name)?;

        let client = ctx.client(SERVICE, data).await?;
        let pending = JobPaths {
            cluster_id,
            job_name: name.clone(),
        };
        let created: CreateJobResponse = client
            .post(&pending.collection(&client)?, RequestOpts::new().body(&opts)?)
            .await?
            .json()?;

        let paths = JobPaths {
            job_name: match created.name.as_str() {
                "" => name,
                created => created.to_string(),
            },
            ..pending
        };
        data.set_id(paths.id());
        info!(id = %paths.id(), "CDM job created, starting it");

        let timeout = ctx.timeouts(self.timeouts()).create;
        start_and_wait(ctx, &client, &paths, timeout).await
    }

    async fn read(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<ReadOutcome> {
        let paths = JobPaths::from_id(data.require_id()?)?;
        let region = ctx.region(data);
        let client = ctx.client(SERVICE, data).await?;

        let job = match get_job(&client, &paths.job(&client)?).await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(ReadOutcome::Absent),
            Err(e) => return check_deleted(e, data, "CDM job"),
        };

        data.set("region", region)?;
        data.set("name", &job.name)?;
        data.set("cluster_id", &paths.cluster_id)?;
        data.set("job_type", &job.job_type)?;
        data.set("source_connector", &job.from_connector_name)?;
        data.set("source_link_name", &job.from_link_name)?;
        data.set(
            "source_job_config",
            flatten_job_config(FROM_JOB_CONFIG, &job.from_config_values),
        )?;
        data.set("destination_connector", &job.to_connector_name)?;
        data.set("destination_link_name", &job.to_link_name)?;
        data.set(
            "destination_job_config",
            flatten_job_config(TO_JOB_CONFIG, &job.to_config_values),
        )?;
        data.set("config", flatten_driver_config(&job.driver_config_values)?)?;
        data.set("status", &job.status)?;
        Ok(ReadOutcome::Present)
    }

    async fn update(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        if !data.has_changes(&["source_job_config", "destination_job_config", "config"]) {
            return Ok(());
        }

        let paths = JobPaths::from_id(data.require_id()?)?;
        let client = ctx.client(SERVICE, data).await?;
        let job_url = paths.job(&client)?;

        let job = get_job(&client, &job_url)
            .await?
            .ok_or_else(|| ResourceError::NotFound(format!("CDM job {}", paths.id())))?;
        stop_if_active(&client, &paths, &job).await?;

        let opts = job_opts(data, &paths.job_name)?;
        client
            .put(&job_url, RequestOpts::new().body(&opts)?)
            .await?;

        let timeout = ctx.timeouts(self.timeouts()).update;
        start_and_wait(ctx, &client, &paths, timeout).await
    }

    async fn delete(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()> {
        let paths = JobPaths::from_id(data.require_id()?)?;
        let client = ctx.client(SERVICE, data).await?;
        let job_url = paths.job(&client)?;

        let job = match get_job(&client, &job_url).await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(()),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        stop_if_active(&client, &paths, &job).await?;

        client.delete(&job_url, RequestOpts::new()).await?;
        Ok(())
    }
}
