use pbi_core::models::Workspace;
use serde::{Deserialize, Serialize};

/// 工作区响应
#[derive(Debug, Serialize)]
pub struct WorkspaceDto {
    pub id: String,
    pub name: String,
    pub workspace_type: Option<String>,
    pub state: Option<String>,
    pub capacity_id: Option<String>,
    pub is_premium_capacity: bool,
}

impl From<Workspace> for WorkspaceDto {
    fn from(ws: Workspace) -> Self {
        Self {
            is_premium_capacity: ws.is_premium_capacity(),
            id: ws.id,
            name: ws.name,
            workspace_type: ws.workspace_type,
            state: ws.state,
            capacity_id: ws.capacity_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BackupRequest {
    pub workspace_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanQuery {
    pub backup_id: String,
    pub target_workspace_id: String,
}

/// `POST /api/restore/components/{workspace_id}` 的查询参数
#[derive(Debug, Deserialize)]
pub struct RestoreComponentsQuery {
    pub backup_id: Option<String>,
    #[serde(default)]
    pub restore_reports: bool,
    #[serde(default)]
    pub restore_datasets: bool,
    #[serde(default)]
    pub restore_refresh_schedules: bool,
    #[serde(default)]
    pub restore_dashboards: bool,
    #[serde(default)]
    pub restore_dataflows: bool,
    #[serde(default)]
    pub restore_apps: bool,
}

#[derive(Debug, Serialize)]
pub struct PbixFileDto {
    pub report_id: String,
    pub report_name: String,
    pub pbix_file: String,
    pub file_size_bytes: Option<u64>,
}
