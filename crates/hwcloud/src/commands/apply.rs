use crate::{Runtime, utils};
use colored::Colorize;
use hwcloud_resource::{
    ActionType, Lifecycle, Plan, ResourceData, ResourceError, ResourceState, ResourceStatus,
    StateFile, plan,
};
use serde_json::Value;
use std::path::Path;

pub async fn handle(
    runtime: &Runtime,
    resource_type: &str,
    name: &str,
    file: &Path,
) -> anyhow::Result<()> {
    let adapter = runtime.registry.resource(resource_type)?;
    let desired = utils::read_json(file)?;
    adapter.schema().validate(&desired)?;

    let lifecycle = Lifecycle::new(adapter, runtime.ctx.clone());
    let (lock, mut state) = super::lock_state(runtime).await?;
    let result = apply(runtime, &mut state, lifecycle, name, desired).await;
    lock.release().await?;
    result
}

/// Tainted resources never became ready and are always replaced
fn plan_for(lifecycle: &Lifecycle, existing: Option<&ResourceState>, desired: &Value) -> Plan {
    match existing {
        Some(prior) if prior.status == ResourceStatus::Tainted => Plan {
            action_type: ActionType::Replace,
            changed: Vec::new(),
            forces_replacement: Vec::new(),
        },
        prior => plan(
            &lifecycle.adapter().schema(),
            prior.map(|p| &p.config),
            Some(desired),
        ),
    }
}

async fn apply(
    runtime: &Runtime,
    state: &mut StateFile,
    lifecycle: Lifecycle,
    name: &str,
    desired: Value,
) -> anyhow::Result<()> {
    let resource_type = lifecycle.adapter().type_name();
    let address = StateFile::address(resource_type, name);
    let existing = state.get_resource(&address).cloned();
    let plan = plan_for(&lifecycle, existing.as_ref(), &desired);

    println!("{} {}: {}", "■".cyan(), address.bold(), plan.to_string().yellow());
    if !plan.has_changes() {
        println!("{}", "変更はありません".green());
        return Ok(());
    }

    let region = runtime.ctx.region(&ResourceData::new(desired.clone()));
    let outcome = lifecycle
        .execute(
            plan.action_type,
            existing.as_ref().map(ResourceState::to_data),
            Some(desired.clone()),
        )
        .await;

    match outcome {
        Ok(Some(data)) => {
            let mut entry = ResourceState::from_data(resource_type, &region, &data)?;
            if let Some(prior) = existing.filter(|_| plan.action_type == ActionType::Update) {
                entry = entry.created_at(prior.created_at);
            }
            utils::print_resource(&address, &entry);
            state.set_resource(address, entry);
        }
        Ok(None) => {
            state.remove_resource(&address);
        }
        Err(ResourceError::Tainted { id, source }) => {
            // Keep tracking the half-created resource so the next apply replaces it
            let entry = ResourceState::new(id, resource_type, &region)
                .with_config(desired)
                .with_status(ResourceStatus::Tainted);
            state.set_resource(address.clone(), entry);
            runtime.state.save(state).await?;
            return Err(anyhow::anyhow!(
                "{address} は作成されましたが利用可能になりませんでした (tainted): {source}"
            ));
        }
        Err(ResourceError::ReplacementFailed { id, source }) => {
            // The old resource is gone and nothing took its place
            state.remove_resource(&address);
            runtime.state.save(state).await?;
            return Err(anyhow::anyhow!(
                "{address} ({id}) は削除されましたが、再作成に失敗しました: {source}"
            ));
        }
        Err(e) => return Err(e.into()),
    }

    runtime.state.save(state).await?;
    println!("{}", format!("✓ {} 完了", plan.action_type).green());
    Ok(())
}
