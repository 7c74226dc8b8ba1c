use crate::app::CliApp;
use anyhow::Result;
use tracing::info;

/// 列出可访问的工作区
pub async fn run_workspaces(app: &CliApp) -> Result<()> {
    info!("🔍 获取工作区列表...");
    let workspaces = app.api.list_workspaces().await?;

    if workspaces.is_empty() {
        info!("📭 服务主体没有可访问的工作区");
        info!("💡 请确认服务主体已被添加为工作区成员");
        return Ok(());
    }

    for ws in &workspaces {
        let capacity = if ws.is_premium_capacity() {
            "Premium"
        } else {
            "共享"
        };
        println!("{}\t{}\t{}", ws.id, ws.name, capacity);
    }
    Ok(())
}
