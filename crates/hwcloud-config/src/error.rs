use hwcloud_sdk::SdkError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("設定ファイルが見つかりません: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("設定ファイルの読み込みに失敗しました ({path}): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("リージョンが指定されていません (region / HW_REGION_NAME / OS_REGION_NAME)")]
    MissingRegion,

    #[error("認証トークンが指定されていません (auth_token / HW_AUTH_TOKEN / OS_AUTH_TOKEN)")]
    MissingAuthToken,

    #[error("環境変数 {name} の値が不正です: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("サービス {service} のエンドポイントが絶対URLではありません: {url}")]
    InvalidEndpoint { service: String, url: String },

    #[error("未知のサービスです: {0}")]
    UnknownService(String),

    #[error(
        "リソースのリージョン ({requested}) がプロバイダーのリージョン ({provider}) と異なります。\
        トークン認証はリージョン単位で有効です"
    )]
    RegionMismatch { requested: String, provider: String },

    #[error("リージョン {0} のプロジェクトが見つかりません")]
    ProjectNotFound(String),

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
