use crate::app::CliApp;
use crate::utils::format_size_mb;
use anyhow::Result;
use pbi_core::BackupId;
use tracing::{info, warn};

/// 立即备份工作区
pub async fn run_backup(app: &CliApp, workspace_id: &str) -> Result<()> {
    info!("💾 备份工作区 {}", workspace_id);
    info!("===============");

    let summary = app.backup_service.backup_now(workspace_id).await?;
    let record = app.storage.load(&summary.backup_id).await?;

    for exported in &record.reports {
        match (&exported.pbix_file, exported.file_size_bytes) {
            (Some(path), Some(size)) => {
                info!("   ✅ {} -> {} ({})", exported.report.name, path, format_size_mb(size))
            }
            _ => warn!("   ⚠️  {} 导出失败", exported.report.name),
        }
    }

    info!("✅ 备份完成: {}", summary.backup_id);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// 列出所有备份
pub async fn run_list_backups(app: &CliApp) -> Result<()> {
    let backups = app.storage.list().await?;

    if backups.is_empty() {
        info!("📦 暂无备份");
        info!("💡 使用 'pbi-backup backup <workspace_id>' 创建备份");
        return Ok(());
    }

    info!("📦 共 {} 个备份 ({})", backups.len(), app.storage.root().display());
    for id in backups {
        match app.storage.load(&id).await {
            Ok(record) => println!(
                "{}\t{}\t{}\t报表 {}/{}",
                id,
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.workspace_name().unwrap_or(&record.workspace_id),
                record.export_summary().successful,
                record.export_summary().total,
            ),
            Err(e) => {
                warn!("⚠️  无法读取备份 {}: {}", id, e);
                println!("{id}");
            }
        }
    }
    Ok(())
}

/// 删除备份
pub async fn run_delete_backup(app: &CliApp, backup_id: &str) -> Result<()> {
    let id: BackupId = backup_id.parse()?;
    app.storage.delete(&id).await?;
    info!("🗑️  备份已删除: {}", id);
    Ok(())
}
