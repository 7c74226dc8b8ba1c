use anyhow::{Context, Result};
use pbi_core::{
    api::{ApiClient, PowerBiApi},
    api_config::ApiConfig,
    authenticated_client::{AuthenticatedClient, ServicePrincipal},
    backup::BackupService,
    config::AppConfig,
    jobs::JobRegistry,
    restore::RestoreService,
    storage::BackupStorage,
};
use std::path::Path;
use std::sync::Arc;

use crate::cli::Commands;
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub api: Arc<dyn PowerBiApi>,
    pub storage: BackupStorage,
    pub jobs: JobRegistry,
    pub backup_service: BackupService,
    pub restore_service: RestoreService,
}

impl CliApp {
    /// 加载配置并创建 Power BI API 客户端
    pub fn new(config_path: &Path) -> Result<Self> {
        let config = AppConfig::load(config_path).context("加载配置失败")?;
        config
            .ensure_backup_dir()
            .with_context(|| format!("无法创建备份目录 {}", config.backup.storage_dir))?;

        let principal = ServicePrincipal::from_config(&config.powerbi)?;
        let http = AuthenticatedClient::new(principal, config.http.timeout_secs)?;
        let api = ApiClient::new(
            http,
            ApiConfig::with_base_url(config.powerbi.api_base_url.clone()),
        );

        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// 使用给定的 API 实现组装各个服务
    pub fn with_api(config: AppConfig, api: Arc<dyn PowerBiApi>) -> Self {
        let storage = BackupStorage::new(config.get_backup_dir());
        let jobs = JobRegistry::new();
        let backup_service = BackupService::new(api.clone(), storage.clone(), jobs.clone());
        let restore_service =
            RestoreService::new(api.clone(), storage.clone(), jobs.clone(), &config.restore);

        Self {
            config,
            api,
            storage,
            jobs,
            backup_service,
            restore_service,
        }
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { .. } => unreachable!(), // 已经在 main.rs 中处理
            Commands::Serve { host, port } => commands::run_serve(self, host, port).await,
            Commands::Workspaces => commands::run_workspaces(self).await,
            Commands::Backup { workspace_id } => commands::run_backup(self, &workspace_id).await,
            Commands::ListBackups => commands::run_list_backups(self).await,
            Commands::DeleteBackup { backup_id } => {
                commands::run_delete_backup(self, &backup_id).await
            }
            Commands::Plan {
                backup_id,
                target_workspace_id,
            } => commands::run_plan(self, &backup_id, &target_workspace_id).await,
            Commands::Restore {
                backup_id,
                target_workspace_id,
                components,
            } => {
                commands::run_restore(self, &backup_id, &target_workspace_id, components.into())
                    .await
            }
        }
    }
}
