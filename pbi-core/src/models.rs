use crate::backup_id::BackupId;
use crate::constants::backup::FORMAT_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 厂商返回但本服务不关心的字段，原样保留在备份中
pub type ExtraFields = Map<String, Value>;

/// OData 列表响应 `{"value": [...]}`
#[derive(Debug, Deserialize)]
pub struct ODataList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// 工作区（Power BI 中称为 group）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub workspace_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_id: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Workspace {
    /// 分配了容量的工作区即为 Premium 容量工作区
    pub fn is_premium_capacity(&self) -> bool {
        self.capacity_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_refreshable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_by: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dataflow {
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_notify_option() -> String {
    "MailOnFailure".to_string()
}

/// 数据集刷新计划
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSchedule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default = "default_time_zone")]
    pub local_time_zone_id: String,
    #[serde(default = "default_notify_option")]
    pub notify_option: String,
}

impl RefreshSchedule {
    /// 只有启用且同时配置了星期和时间点的计划才需要恢复
    pub fn is_restorable(&self) -> bool {
        self.enabled && !self.days.is_empty() && !self.times.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetRefreshSchedule {
    pub dataset_id: String,
    pub dataset_name: String,
    pub schedule: RefreshSchedule,
}

/// 单个报表的 PBIX 导出结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportStatus {
    Success,
    Failed { reason: String },
}

impl ExportStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedReport {
    pub report: Report,
    pub export_status: ExportStatus,
    /// 相对于备份目录的 PBIX 路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbix_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
}

impl ExportedReport {
    pub fn success(report: Report, pbix_file: String, file_size_bytes: u64) -> Self {
        Self {
            report,
            export_status: ExportStatus::Success,
            pbix_file: Some(pbix_file),
            file_size_bytes: Some(file_size_bytes),
        }
    }

    pub fn failed(report: Report, reason: impl Into<String>) -> Self {
        Self {
            report,
            export_status: ExportStatus::Failed {
                reason: reason.into(),
            },
            pbix_file: None,
            file_size_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// 备份记录（清单）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupRecord {
    pub backup_id: BackupId,
    #[serde(default = "default_format_version")]
    pub version: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reports: Vec<ExportedReport>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub dataflows: Vec<Dataflow>,
    #[serde(default)]
    pub dashboards: Vec<Dashboard>,
    #[serde(default)]
    pub apps: Vec<App>,
    #[serde(default)]
    pub refresh_schedules: Vec<DatasetRefreshSchedule>,
}

fn default_format_version() -> String {
    FORMAT_VERSION.to_string()
}

impl BackupRecord {
    pub fn new(backup_id: BackupId, workspace_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            backup_id,
            version: default_format_version(),
            workspace_id: workspace_id.into(),
            workspace: None,
            timestamp,
            reports: Vec::new(),
            datasets: Vec::new(),
            dataflows: Vec::new(),
            dashboards: Vec::new(),
            apps: Vec::new(),
            refresh_schedules: Vec::new(),
        }
    }

    pub fn export_summary(&self) -> ExportSummary {
        let successful = self
            .reports
            .iter()
            .filter(|r| r.export_status.is_success())
            .count();
        ExportSummary {
            total: self.reports.len(),
            successful,
            failed: self.reports.len() - successful,
        }
    }

    pub fn workspace_name(&self) -> Option<&str> {
        self.workspace.as_ref().map(|w| w.name.as_str())
    }
}

/// PBIX 导入任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImportState {
    Publishing,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportedArtifact {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// PBIX 导入任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_state: Option<ImportState>,
    #[serde(default)]
    pub datasets: Vec<ImportedArtifact>,
    #[serde(default)]
    pub reports: Vec<ImportedArtifact>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schedule(enabled: bool, days: &[&str], times: &[&str]) -> RefreshSchedule {
        RefreshSchedule {
            enabled,
            days: days.iter().map(|s| s.to_string()).collect(),
            times: times.iter().map(|s| s.to_string()).collect(),
            local_time_zone_id: "UTC".into(),
            notify_option: "MailOnFailure".into(),
        }
    }

    #[test]
    fn test_refresh_schedule_restorable_matrix() {
        for enabled in [true, false] {
            for days in [&[][..], &["Monday"][..]] {
                for times in [&[][..], &["07:00"][..]] {
                    let expected = enabled && !days.is_empty() && !times.is_empty();
                    assert_eq!(
                        schedule(enabled, days, times).is_restorable(),
                        expected,
                        "enabled={enabled} days={days:?} times={times:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_refresh_schedule_vendor_format() {
        let schedule: RefreshSchedule = serde_json::from_value(json!({
            "@odata.context": "https://api.powerbi.com/v1.0/myorg/$metadata#refreshSchedule",
            "days": ["Monday"],
            "times": [],
            "enabled": true
        }))
        .unwrap();

        assert!(!schedule.is_restorable());
        assert_eq!(schedule.local_time_zone_id, "UTC");
        assert_eq!(schedule.notify_option, "MailOnFailure");

        let out = serde_json::to_value(&schedule).unwrap();
        assert_eq!(out["localTimeZoneId"], "UTC");
        assert!(out.get("@odata.context").is_none());
    }

    #[test]
    fn test_vendor_extra_fields_preserved() {
        let raw = json!({
            "id": "r-1",
            "name": "Revenue",
            "datasetId": "d-1",
            "reportType": "PowerBIReport",
            "embedUrl": "https://app.powerbi.com/reportEmbed?reportId=r-1"
        });
        let report: Report = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(report.dataset_id.as_deref(), Some("d-1"));
        assert_eq!(report.extra["reportType"], "PowerBIReport");
        assert_eq!(serde_json::to_value(&report).unwrap(), raw);
    }

    #[test]
    fn test_export_status_shape() {
        let failed = ExportStatus::Failed {
            reason: "403".into(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"status": "failed", "reason": "403"})
        );
        assert_eq!(
            serde_json::to_value(ExportStatus::Success).unwrap(),
            json!({"status": "success"})
        );
    }

    #[test]
    fn test_workspace_premium_flag_and_import_state() {
        let ws: Workspace = serde_json::from_value(json!({
            "id": "w-1", "name": "Sales", "type": "Workspace", "capacityId": "cap-1"
        }))
        .unwrap();
        assert!(ws.is_premium_capacity());
        assert_eq!(ws.workspace_type.as_deref(), Some("Workspace"));

        let info: ImportInfo = serde_json::from_value(json!({
            "id": "imp-1", "importState": "Queued", "datasets": [{"id": "d-9", "name": "Sales"}]
        }))
        .unwrap();
        assert_eq!(info.import_state, Some(ImportState::Unknown));
        assert_eq!(info.datasets[0].id, "d-9");
    }
}
