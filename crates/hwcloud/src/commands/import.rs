use crate::{Runtime, utils};
use anyhow::bail;
use colored::Colorize;
use hwcloud_resource::{Lifecycle, ResourceState, StateFile};

pub async fn handle(
    runtime: &Runtime,
    resource_type: &str,
    name: &str,
    id: &str,
) -> anyhow::Result<()> {
    let adapter = runtime.registry.resource(resource_type)?;
    let lifecycle = Lifecycle::new(adapter, runtime.ctx.clone());

    let (lock, mut state) = super::lock_state(runtime).await?;
    let result = import(runtime, &mut state, &lifecycle, name, id).await;
    lock.release().await?;
    result
}

async fn import(
    runtime: &Runtime,
    state: &mut StateFile,
    lifecycle: &Lifecycle,
    name: &str,
    id: &str,
) -> anyhow::Result<()> {
    let resource_type = lifecycle.adapter().type_name();
    let address = StateFile::address(resource_type, name);
    if let Some(existing) = state.get_resource(&address) {
        bail!("{address} は既に {} として管理されています", existing.id);
    }

    let data = lifecycle.import(id).await?;
    let config = utils::config_from_attributes(&lifecycle.adapter().schema(), data.attributes());
    let region = runtime.ctx.region(&data);
    let entry = ResourceState::from_data(resource_type, region, &data)?.with_config(config);

    utils::print_resource(&address, &entry);
    state.set_resource(address, entry);
    runtime.state.save(state).await?;
    println!("{}", "✓ インポートしました".green());
    Ok(())
}
