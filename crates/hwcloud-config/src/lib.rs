//! hwcloud のプロバイダー設定
//!
//! 設定は YAML ファイルと環境変数から読み込み、環境変数が優先される。
//! [`ClientFactory`] は設定からサービスごとの `ServiceClient` を組み立てる。

pub mod error;
pub mod factory;

pub use error::*;
pub use factory::ClientFactory;

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// プロバイダー設定
#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CloudConfig {
    pub region: String,
    pub cloud: String,
    pub auth_token: String,
    pub project_id: Option<String>,
    pub domain_id: Option<String>,
    pub enterprise_project_id: Option<String>,
    /// サービスキー → カスタムエンドポイント
    pub endpoints: HashMap<String, String>,
    /// グローバルサービスでもリージョンエンドポイントを使う
    pub regional: bool,
    /// HTTP 429 のリトライ回数
    pub max_retries: u32,
    pub insecure: bool,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            cloud: DEFAULT_CLOUD.to_string(),
            auth_token: String::new(),
            project_id: None,
            domain_id: None,
            enterprise_project_id: None,
            endpoints: HashMap::new(),
            regional: false,
            max_retries: DEFAULT_MAX_RETRIES,
            insecure: false,
        }
    }
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("region", &self.region)
            .field("cloud", &self.cloud)
            .field("auth_token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("domain_id", &self.domain_id)
            .field("enterprise_project_id", &self.enterprise_project_id)
            .field("endpoints", &self.endpoints)
            .field("regional", &self.regional)
            .field("max_retries", &self.max_retries)
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl CloudConfig {
    /// 設定を読み込む
    ///
    /// `path` が指定されていればそのファイルを、なければ [`find_config_file`]
    /// で見つかったファイルを読み、環境変数で上書きしてから検証する。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file()?,
        };

        let mut config = match file {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;

        Ok(config)
    }

    /// YAML ファイルから読み込む（環境変数は反映しない）
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "loading config file");
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 環境変数の値で上書きする
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(region) = env_any(&["HW_REGION_NAME", "OS_REGION_NAME"]) {
            self.region = region;
        }
        if let Some(cloud) = env_any(&["HW_CLOUD"]) {
            self.cloud = cloud;
        }
        if let Some(token) = env_any(&["HW_AUTH_TOKEN", "OS_AUTH_TOKEN"]) {
            self.auth_token = token;
        }
        if let Some(project_id) = env_any(&["HW_PROJECT_ID", "OS_PROJECT_ID"]) {
            self.project_id = Some(project_id);
        }
        if let Some(domain_id) = env_any(&["HW_DOMAIN_ID"]) {
            self.domain_id = Some(domain_id);
        }
        if let Some(eps) = env_any(&["HW_ENTERPRISE_PROJECT_ID"]) {
            self.enterprise_project_id = Some(eps);
        }
        if let Some(value) = env_any(&["HW_MAX_RETRIES"]) {
            self.max_retries = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "HW_MAX_RETRIES".to_string(),
                value,
            })?;
        }
        if let Some(value) = env_any(&["HW_INSECURE"]) {
            self.insecure = parse_bool("HW_INSECURE", value)?;
        }
        if let Some(value) = env_any(&["HW_REGIONAL"]) {
            self.regional = parse_bool("HW_REGIONAL", value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        if self.auth_token.is_empty() {
            return Err(ConfigError::MissingAuthToken);
        }
        for (service, url) in &self.endpoints {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidEndpoint {
                    service: service.clone(),
                    url: url.clone(),
                });
            }
        }
        Ok(())
    }
}

fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

fn parse_bool(name: &str, value: String) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
        }),
    }
}

/// hwcloud のグローバル設定ディレクトリ
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("hwcloud"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 HW_SHARED_CONFIG_FILE (直接パス指定、存在しなければエラー)
/// 2. ./.hwcloud/config.yaml
/// 3. ~/.config/hwcloud/config.yaml (グローバル設定)
///
/// どれも無ければ `None`（環境変数だけで設定できる）。
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(path) = std::env::var("HW_SHARED_CONFIG_FILE") {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path));
        }
        return Ok(Some(path));
    }

    let local = std::env::current_dir()?.join(".hwcloud").join(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("hwcloud").join(CONFIG_FILE_NAME);
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}
