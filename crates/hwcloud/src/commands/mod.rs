pub mod apply;
pub mod destroy;
pub mod import;
pub mod query;
pub mod show;
pub mod types;

use crate::Runtime;
use anyhow::Context;
use hwcloud_resource::{StateFile, StateLock};

/// 状態ファイルをロックしてから読み込む
pub async fn lock_state(runtime: &Runtime) -> anyhow::Result<(StateLock, StateFile)> {
    let lock = runtime
        .state
        .acquire_lock()
        .await
        .context("状態ファイルをロックできません")?;
    let state = runtime.state.load().await?;
    Ok((lock, state))
}
