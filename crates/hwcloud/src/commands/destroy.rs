use crate::Runtime;
use anyhow::anyhow;
use colored::Colorize;
use hwcloud_resource::{Lifecycle, StateFile};

pub async fn handle(runtime: &Runtime, resource_type: &str, name: &str) -> anyhow::Result<()> {
    let adapter = runtime.registry.resource(resource_type)?;
    let lifecycle = Lifecycle::new(adapter, runtime.ctx.clone());

    let (lock, mut state) = super::lock_state(runtime).await?;
    let result = destroy(runtime, &mut state, &lifecycle, name).await;
    lock.release().await?;
    result
}

async fn destroy(
    runtime: &Runtime,
    state: &mut StateFile,
    lifecycle: &Lifecycle,
    name: &str,
) -> anyhow::Result<()> {
    let address = StateFile::address(lifecycle.adapter().type_name(), name);
    let tracked = state
        .get_resource(&address)
        .ok_or_else(|| anyhow!("{address} は状態ファイルにありません"))?;

    println!("{}", format!("{address} ({}) を削除中...", tracked.id).yellow());
    lifecycle.delete(tracked.to_data()).await?;

    state.remove_resource(&address);
    runtime.state.save(state).await?;
    println!("{}", format!("✓ {address} を削除しました").green());
    Ok(())
}
