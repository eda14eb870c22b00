mod commands;
mod utils;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use hwcloud_config::{ClientFactory, CloudConfig};
use hwcloud_resource::{OperationContext, PollTiming, StateManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "hwcloud")]
#[command(about = "HuaweiCloud のリソースを宣言的に管理する", long_about = None)]
struct Cli {
    /// 詳細ログを出力 (RUST_LOG が優先)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// プロバイダー設定ファイル (YAML)
    #[arg(long, global = true, env = "HW_SHARED_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// 状態ファイルのディレクトリ (デフォルト: ./.hwcloud)
    #[arg(long, global = true, env = "HWCLOUD_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// 設定ファイルのリージョンを上書き
    #[arg(long, global = true)]
    region: Option<String>,

    /// ポーリング間隔 (秒)。リソースごとの既定値を上書き
    #[arg(long, global = true, value_name = "SECS")]
    poll_interval: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 設定ファイルの内容をリソースに反映
    Apply {
        /// リソースタイプ (例: huaweicloud_dcs_instance)
        resource_type: String,
        /// 状態ファイル上のリソース名
        name: String,
        /// リソース設定 (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// クラウドから最新の状態を取得して表示
    Show {
        resource_type: String,
        name: String,
    },
    /// リソースを削除して状態から外す
    Destroy {
        resource_type: String,
        name: String,
    },
    /// 既存のリソースを状態に取り込む
    Import {
        resource_type: String,
        name: String,
        /// クラウド上の ID
        id: String,
    },
    /// データソースを読み込んで結果を表示
    Query {
        /// データソースタイプ (例: huaweicloud_ga_accelerators)
        data_source: String,
        /// 引数 (JSON)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// 利用可能なリソースとデータソースを一覧表示
    Types,
    /// バージョン情報を表示
    Version,
}

/// Everything a command needs once the provider is configured
struct Runtime {
    ctx: OperationContext,
    state: StateManager,
    registry: hwcloud_resource::Registry,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_runtime(cli: &Cli) -> anyhow::Result<Runtime> {
    let mut config =
        CloudConfig::load(cli.config.as_deref()).context("プロバイダー設定の読み込みに失敗しました")?;
    if let Some(region) = &cli.region {
        config.region = region.clone();
    }
    let factory = ClientFactory::new(config).context("HTTP クライアントを作成できません")?;

    let cancellation = CancellationToken::new();
    let token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight operations");
            token.cancel();
        }
    });

    let mut ctx = OperationContext::new(Arc::new(factory)).with_cancellation(cancellation);
    if let Some(secs) = cli.poll_interval {
        let interval = Duration::from_secs(secs);
        ctx = ctx.with_poll_timing(PollTiming {
            delay: interval,
            interval,
        });
    }

    let state = match &cli.state_dir {
        Some(dir) => StateManager::in_dir(dir),
        None => StateManager::new(std::env::current_dir()?),
    };

    Ok(Runtime {
        ctx,
        state,
        registry: hwcloud_services::registry(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // 設定ファイル不要のコマンド
    match &cli.command {
        Commands::Version => {
            println!("hwcloud {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Types => {
            commands::types::handle(&hwcloud_services::registry());
            return Ok(());
        }
        _ => {}
    }

    let runtime = build_runtime(&cli)?;
    let result = match &cli.command {
        Commands::Apply {
            resource_type,
            name,
            file,
        } => commands::apply::handle(&runtime, resource_type, name, file).await,
        Commands::Show {
            resource_type,
            name,
        } => commands::show::handle(&runtime, resource_type, name).await,
        Commands::Destroy {
            resource_type,
            name,
        } => commands::destroy::handle(&runtime, resource_type, name).await,
        Commands::Import {
            resource_type,
            name,
            id,
        } => commands::import::handle(&runtime, resource_type, name, id).await,
        Commands::Query { data_source, file } => {
            commands::query::handle(&runtime, data_source, file.as_deref()).await
        }
        Commands::Types | Commands::Version => unreachable!("handled before config loading"),
    };

    if runtime.ctx.cancellation().is_cancelled() {
        eprintln!("{}", "中断されました".yellow());
    }
    result
}
