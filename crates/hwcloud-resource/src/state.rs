//! State management for tracked resources
//!
//! Manages the `.hwcloud/state.json` file which records the identity,
//! configuration and last read attributes of every applied resource.

use crate::data::ResourceData;
use crate::error::{ResourceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".hwcloud";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file version
    pub version: u32,

    /// Incremented on every save
    #[serde(default)]
    pub serial: u64,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by `<type>.<name>`
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of a resource in the state file
    pub fn address(resource_type: &str, name: &str) -> String {
        format!("{}.{}", resource_type, name)
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, address: String, state: ResourceState) {
        self.resources.insert(address, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, address: &str) -> Option<ResourceState> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    /// Resources of one type
    pub fn by_type(&self, resource_type: &str) -> Vec<(&String, &ResourceState)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .collect()
    }
}

/// State of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Cloud-assigned resource ID
    pub id: String,

    pub resource_type: String,

    pub region: String,

    /// Configuration the resource was last applied with
    pub config: Value,

    /// Attributes reported by the cloud
    pub attributes: Map<String, Value>,

    pub status: ResourceStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            region: region.into(),
            config: Value::Object(Map::new()),
            attributes: Map::new(),
            status: ResourceStatus::Ready,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the outcome of an operation on `data`
    pub fn from_data(
        resource_type: impl Into<String>,
        region: impl Into<String>,
        data: &ResourceData,
    ) -> Result<Self> {
        let id = data.require_id()?;
        Ok(Self::new(id, resource_type, region)
            .with_config(data.config().clone())
            .with_attributes(data.attributes().clone()))
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Keep the original creation time when replacing an entry in place
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Rebuild the adapter view of this resource
    pub fn to_data(&self) -> ResourceData {
        ResourceData::new(self.config.clone())
            .with_id(self.id.clone())
            .with_prior(self.config.clone())
            .with_attributes(self.attributes.clone())
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a tracked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Applied and read back successfully
    Ready,
    /// Created but never became ready; replaced on the next apply
    Tainted,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Tainted => write!(f, "tainted"),
        }
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    /// State kept in `<project_root>/.hwcloud`
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::in_dir(project_root.as_ref().join(STATE_DIR))
    }

    /// State kept directly in `state_dir`
    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            debug!(dir = %self.state_dir.display(), "created state directory");
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            debug!(path = %path.display(), "no state file yet");
            return Ok(StateFile::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(ResourceError::StateError(format!(
                "state file version {} is newer than the supported version {}",
                state.version, STATE_VERSION
            )));
        }

        debug!(resources = state.resources.len(), serial = state.serial, "loaded state");
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &mut StateFile) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            debug!(backup = %backup.display(), "kept previous state");
        }

        state.serial += 1;
        state.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        debug!(
            serial = state.serial,
            resources = state.resources.len(),
            "saved state"
        );
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // stale after one hour
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(ResourceError::LockError(format!(
                    "state is held by {} (pid {}) since {}",
                    lock_info.holder, lock_info.pid, lock_info.acquired_at
                )));
            }

            warn!(
                holder = %lock_info.holder,
                since = %lock_info.acquired_at,
                "taking over stale state lock"
            );
        }

        let lock_info = LockInfo {
            holder: ["HOSTNAME", "HOST", "USER"]
                .iter()
                .find_map(|name| std::env::var(name).ok())
                .unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        debug!(pid = lock_info.pid, "acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                debug!("released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
