use crate::{Runtime, utils};
use anyhow::anyhow;
use colored::Colorize;
use hwcloud_resource::{Lifecycle, ResourceState, StateFile};
use serde_json::Value;

pub async fn handle(runtime: &Runtime, resource_type: &str, name: &str) -> anyhow::Result<()> {
    let adapter = runtime.registry.resource(resource_type)?;
    let lifecycle = Lifecycle::new(adapter, runtime.ctx.clone());

    let (lock, mut state) = super::lock_state(runtime).await?;
    let result = show(runtime, &mut state, &lifecycle, name).await;
    lock.release().await?;
    result
}

async fn show(
    runtime: &Runtime,
    state: &mut StateFile,
    lifecycle: &Lifecycle,
    name: &str,
) -> anyhow::Result<()> {
    let resource_type = lifecycle.adapter().type_name();
    let address = StateFile::address(resource_type, name);
    let tracked = state
        .get_resource(&address)
        .cloned()
        .ok_or_else(|| anyhow!("{address} は状態ファイルにありません"))?;

    match lifecycle.refresh(tracked.to_data()).await? {
        Some(data) => {
            let entry = ResourceState::from_data(resource_type, &tracked.region, &data)?
                .with_config(tracked.config.clone())
                .with_status(tracked.status)
                .created_at(tracked.created_at);
            utils::print_resource(&address, &entry);
            utils::print_json(&Value::Object(entry.attributes.clone()))?;
            state.set_resource(address, entry);
        }
        None => {
            println!(
                "{}",
                format!("{address} はクラウド上に存在しないため状態から削除しました").yellow()
            );
            state.remove_resource(&address);
        }
    }

    runtime.state.save(state).await?;
    Ok(())
}
