//! HTTP 服务：JSON API 与静态 Web 界面

mod dto;
mod error;
mod handlers;
mod router;

pub use error::ApiError;
pub use router::build_router;

use crate::app::CliApp;
use pbi_core::{
    api::PowerBiApi, backup::BackupService, jobs::JobRegistry, restore::RestoreService,
    storage::BackupStorage,
};
use std::sync::Arc;

/// 处理器共享的服务
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn PowerBiApi>,
    pub storage: BackupStorage,
    pub jobs: JobRegistry,
    pub backup_service: BackupService,
    pub restore_service: RestoreService,
    pub backup_path: String,
}

impl AppState {
    pub fn from_app(app: &CliApp) -> Self {
        Self {
            api: app.api.clone(),
            storage: app.storage.clone(),
            jobs: app.jobs.clone(),
            backup_service: app.backup_service.clone(),
            restore_service: app.restore_service.clone(),
            backup_path: app.config.backup.storage_dir.clone(),
        }
    }
}
