use pbi_core::{config::AppConfig, error::Result};
use std::path::Path;
use tracing::{info, warn};

/// 生成默认配置文件和备份目录
pub async fn run_init(config_path: &Path, force: bool) -> Result<()> {
    info!("📊 Power BI Backup 初始化");
    info!("==========================");

    if config_path.exists() && !force {
        warn!("⚠️  配置文件已存在: {}", config_path.display());
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: pbi-backup init --force");
        return Ok(());
    }

    let config = AppConfig::default();
    config.save_to_file(config_path)?;
    info!("   ✅ 创建配置文件: {}", config_path.display());

    info!(
        "   📁 备份目录: {}（首次运行其他命令时创建）",
        config.backup.storage_dir
    );

    info!("👉 请在配置文件的 [powerbi] 段中填写服务主体凭据，");
    info!("   或设置环境变量 POWERBI_CLIENT_ID / POWERBI_CLIENT_SECRET / POWERBI_TENANT_ID");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_respects_existing_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "# custom").unwrap();

        run_init(&path, false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# custom");
    }

    #[tokio::test]
    async fn test_init_force_writes_loadable_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "# custom").unwrap();

        run_init(&path, true).await.unwrap();
        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
