use crate::app::CliApp;
use anyhow::Result;
use pbi_core::BackupId;
use pbi_core::restore::{ComponentSelection, ItemStatus};
use tracing::{info, warn};

/// 输出恢复计划
pub async fn run_plan(app: &CliApp, backup_id: &str, target_workspace_id: &str) -> Result<()> {
    let id: BackupId = backup_id.parse()?;
    let plan = app.restore_service.plan(&id, target_workspace_id).await?;

    for step in &plan.step_by_step_guide {
        info!("   {}", step);
    }
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// 在前台执行恢复
pub async fn run_restore(
    app: &CliApp,
    backup_id: &str,
    target_workspace_id: &str,
    selection: ComponentSelection,
) -> Result<()> {
    let id: BackupId = backup_id.parse()?;
    info!("♻️  恢复备份 {} 到工作区 {}", id, target_workspace_id);

    let report = app
        .restore_service
        .restore_now(&id, target_workspace_id, selection)
        .await?;

    for component in &report.components {
        info!(
            "📋 {}: 恢复 {}, 跳过 {}, 失败 {}, 需手动 {}",
            component.component,
            component.restored,
            component.skipped,
            component.failed,
            component.manual
        );
        for item in &component.items {
            let detail = item.detail.as_deref().unwrap_or("");
            match item.status {
                ItemStatus::Failed => warn!("   ❌ {} {}", item.name, detail),
                ItemStatus::Manual => info!("   ✋ {} {}", item.name, detail),
                _ => {}
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
