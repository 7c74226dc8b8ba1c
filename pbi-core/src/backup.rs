use crate::api::PowerBiApi;
use crate::backup_id::BackupId;
use crate::error::{PbiError, Result};
use crate::jobs::{JobKind, JobRegistry, JobResult};
use crate::models::{BackupRecord, DatasetRefreshSchedule, ExportedReport, Report, Workspace};
use crate::storage::BackupStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 备份结果统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupSummary {
    pub backup_id: BackupId,
    pub reports: usize,
    pub reports_exported: usize,
    pub reports_failed: usize,
    pub datasets: usize,
    pub dataflows: usize,
    pub dashboards: usize,
    pub apps: usize,
    pub refresh_schedules: usize,
}

impl BackupSummary {
    pub fn from_record(record: &BackupRecord) -> Self {
        let exports = record.export_summary();
        Self {
            backup_id: record.backup_id.clone(),
            reports: exports.total,
            reports_exported: exports.successful,
            reports_failed: exports.failed,
            datasets: record.datasets.len(),
            dataflows: record.dataflows.len(),
            dashboards: record.dashboards.len(),
            apps: record.apps.len(),
            refresh_schedules: record.refresh_schedules.len(),
        }
    }
}

/// 已受理的备份请求
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StartedBackup {
    pub job_id: Uuid,
    pub backup_id: BackupId,
    pub timestamp: DateTime<Utc>,
}

/// 备份服务
#[derive(Clone)]
pub struct BackupService {
    api: Arc<dyn PowerBiApi>,
    storage: BackupStorage,
    jobs: JobRegistry,
}

impl BackupService {
    pub fn new(api: Arc<dyn PowerBiApi>, storage: BackupStorage, jobs: JobRegistry) -> Self {
        Self { api, storage, jobs }
    }

    fn new_backup_id(workspace: &Workspace) -> (BackupId, DateTime<Utc>) {
        let id = BackupId::new(&workspace.name, Utc::now().naive_utc());
        let timestamp = id.taken_at().map(|t| t.and_utc()).unwrap_or_else(Utc::now);
        (id, timestamp)
    }

    /// 受理备份请求并在后台执行
    ///
    /// 工作区查询在请求路径上完成，认证失败或工作区不存在会直接返回错误。
    pub async fn start_backup(&self, workspace_id: &str) -> Result<StartedBackup> {
        let workspace = self.api.get_workspace(workspace_id).await?;
        let (backup_id, timestamp) = Self::new_backup_id(&workspace);
        self.start_backup_as(workspace, backup_id, timestamp).await
    }

    async fn start_backup_as(
        &self,
        workspace: Workspace,
        backup_id: BackupId,
        timestamp: DateTime<Utc>,
    ) -> Result<StartedBackup> {
        self.ensure_unused(&backup_id).await?;
        let job_id = self.jobs.create_backup(&workspace.id, backup_id.clone())?;
        info!(
            "📦 开始备份工作区 {} ({})，备份ID: {}",
            workspace.name, workspace.id, backup_id
        );

        let service = self.clone();
        let task_backup_id = backup_id.clone();
        tokio::spawn(async move {
            service.jobs.mark_in_progress(job_id);
            match service.run_backup(&workspace, task_backup_id).await {
                Ok(summary) => service.jobs.complete(job_id, JobResult::Backup(summary)),
                Err(e) => {
                    error!("❌ 备份任务 {} 失败: {}", job_id, e);
                    service.jobs.fail(job_id, e.to_string());
                }
            }
        });

        Ok(StartedBackup {
            job_id,
            backup_id,
            timestamp,
        })
    }

    /// 在当前任务中执行一次完整备份
    pub async fn backup_now(&self, workspace_id: &str) -> Result<BackupSummary> {
        let workspace = self.api.get_workspace(workspace_id).await?;
        let (backup_id, _) = Self::new_backup_id(&workspace);
        self.ensure_unused(&backup_id).await?;
        self.run_backup(&workspace, backup_id).await
    }

    /// 备份ID精确到秒，同一秒内的重复请求不能写入同一个目录
    async fn ensure_unused(&self, backup_id: &BackupId) -> Result<()> {
        if self.storage.exists(backup_id).await? {
            return Err(PbiError::conflict(format!("备份 {backup_id} 已存在")));
        }
        Ok(())
    }

    /// 执行备份的全部步骤并写入清单
    pub async fn run_backup(&self, workspace: &Workspace, backup_id: BackupId) -> Result<BackupSummary> {
        let ws = workspace.id.as_str();
        let timestamp = backup_id
            .taken_at()
            .map(|t| t.and_utc())
            .unwrap_or_else(Utc::now);

        let mut record = BackupRecord::new(backup_id, ws, timestamp);
        record.workspace = Some(workspace.clone());

        // 1. 报表及 PBIX 导出
        let reports = self.api.list_reports(ws).await?;
        info!("找到 {} 个报表，开始导出 PBIX", reports.len());
        for report in reports {
            let exported = self.export_report(&record.backup_id, ws, report).await;
            record.reports.push(exported);
        }

        // 2. 数据集
        record.datasets = self.api.list_datasets(ws).await?;
        info!("找到 {} 个数据集", record.datasets.len());

        // 3. 数据流与仪表板
        record.dataflows = self.api.list_dataflows(ws).await.unwrap_or_else(|e| {
            warn!("⚠️ 获取数据流失败，按空列表处理: {}", e);
            Vec::new()
        });
        record.dashboards = self.api.list_dashboards(ws).await?;

        // 4. 应用（需要额外权限）
        record.apps = match self.api.list_apps().await {
            Ok(apps) => apps
                .into_iter()
                .filter(|app| app.workspace_id.as_deref() == Some(ws))
                .collect(),
            Err(e) => {
                warn!("⚠️ 获取应用列表失败，按空列表处理: {}", e);
                Vec::new()
            }
        };

        // 5. 刷新计划
        for dataset in &record.datasets {
            match self.api.get_refresh_schedule(ws, &dataset.id).await {
                Ok(schedule) => record.refresh_schedules.push(DatasetRefreshSchedule {
                    dataset_id: dataset.id.clone(),
                    dataset_name: dataset.name.clone(),
                    schedule,
                }),
                Err(e) => debug!("数据集 {} 没有可读取的刷新计划: {}", dataset.name, e),
            }
        }

        // 6. 写入清单
        self.storage.save(&record).await?;

        let summary = BackupSummary::from_record(&record);
        info!(
            "✅ 备份完成: {} (报表 {}/{}, 数据集 {}, 刷新计划 {})",
            summary.backup_id,
            summary.reports_exported,
            summary.reports,
            summary.datasets,
            summary.refresh_schedules
        );
        Ok(summary)
    }

    /// 导出单个报表，失败时记录在条目上
    async fn export_report(&self, backup_id: &BackupId, ws: &str, report: Report) -> ExportedReport {
        let bytes = match self.api.export_report(ws, &report.id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("⚠️ 报表 {} 导出失败: {}", report.name, e);
                return ExportedReport::failed(report, e.to_string());
            }
        };

        match self.storage.write_pbix(backup_id, &report.name, &bytes).await {
            Ok(path) => {
                debug!("报表 {} 已导出到 {}", report.name, path);
                ExportedReport::success(report, path, bytes.len() as u64)
            }
            Err(e) => {
                warn!("⚠️ 报表 {} 写入失败: {}", report.name, e);
                ExportedReport::failed(report, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::models::ExportStatus;
    use crate::testing::{
        ApiCall, FakeApi, app, dashboard, dataflow, dataset, report, schedule, workspace,
    };
    use std::time::Duration;
    use tempfile::tempdir;

    fn sales_api() -> FakeApi {
        FakeApi::new()
            .with_workspace(workspace("ws-1", "Sales Team"))
            .with_report("ws-1", report("r-1", "Revenue"), b"PBIX-1")
            .with_report("ws-1", report("r-2", "Pipeline"), b"PBIX-2")
            .with_failing_export("r-2")
            .with_dataset(
                "ws-1",
                dataset("d-1", "Revenue"),
                Some(schedule(true, &["Monday"], &["07:00"])),
            )
            .with_dataset("ws-1", dataset("d-2", "Scratch"), None)
            .with_dashboard("ws-1", dashboard("db-1", "Overview"))
            .with_dataflow("ws-1", dataflow("df-1", "Staging"))
            .with_app(app("a-1", "Sales App", "ws-1"))
            .with_app(app("a-2", "HR App", "ws-other"))
    }

    fn service(api: Arc<FakeApi>, root: &std::path::Path) -> BackupService {
        BackupService::new(api, BackupStorage::new(root), JobRegistry::new())
    }

    #[tokio::test]
    async fn test_export_failure_does_not_abort_backup() {
        let temp_dir = tempdir().unwrap();
        let api = Arc::new(sales_api());
        let service = service(api.clone(), temp_dir.path());

        let summary = service.backup_now("ws-1").await.unwrap();
        assert_eq!(summary.reports, 2);
        assert_eq!(summary.reports_exported, 1);
        assert_eq!(summary.reports_failed, 1);
        assert_eq!(summary.datasets, 2);
        assert_eq!(summary.dashboards, 1);
        assert_eq!(summary.dataflows, 1);
        // 只保留属于该工作区的应用
        assert_eq!(summary.apps, 1);
        // d-2 没有刷新计划，被跳过
        assert_eq!(summary.refresh_schedules, 1);

        let record = service.storage.load(&summary.backup_id).await.unwrap();
        assert_eq!(record.workspace_name(), Some("Sales Team"));
        assert!(record.reports[0].export_status.is_success());
        assert!(matches!(
            &record.reports[1].export_status,
            ExportStatus::Failed { reason } if reason.contains("403")
        ));
        assert_eq!(record.export_summary().failed, 1);

        let pbix_path = record.reports[0].pbix_file.as_deref().unwrap();
        assert_eq!(
            service
                .storage
                .read_pbix(&summary.backup_id, pbix_path)
                .await
                .unwrap(),
            b"PBIX-1"
        );
    }

    #[tokio::test]
    async fn test_dataflow_failure_yields_empty_list() {
        let temp_dir = tempdir().unwrap();
        let api = Arc::new(sales_api().with_failing_dataflows());
        let service = service(api.clone(), temp_dir.path());

        let summary = service.backup_now("ws-1").await.unwrap();
        assert_eq!(summary.dataflows, 0);
        assert!(api.calls().contains(&ApiCall::ListDataflows("ws-1".into())));
        assert!(api.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_backup_unknown_workspace_aborts_request() {
        let temp_dir = tempdir().unwrap();
        let api = Arc::new(sales_api());
        let service = service(api, temp_dir.path());

        let result = service.start_backup("missing").await;
        assert!(matches!(result, Err(PbiError::NotFound(_))));
        assert!(service.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_start_backup_runs_job_in_background() {
        let temp_dir = tempdir().unwrap();
        let api = Arc::new(sales_api());
        let service = service(api, temp_dir.path());

        let started = service.start_backup("ws-1").await.unwrap();
        assert!(started.backup_id.to_string().starts_with("sales_team_"));

        let mut job = service.jobs.get(&started.job_id).unwrap();
        for _ in 0..200 {
            if job.status.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            job = service.jobs.get(&started.job_id).unwrap();
        }

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.backup_id.as_ref(), Some(&started.backup_id));
        match job.result {
            Some(JobResult::Backup(summary)) => {
                assert_eq!(summary.backup_id, started.backup_id);
                assert_eq!(summary.reports_failed, 1);
            }
            other => panic!("unexpected job result: {other:?}"),
        }
        assert_eq!(
            service.storage.list().await.unwrap(),
            vec![started.backup_id]
        );
    }

    #[tokio::test]
    async fn test_duplicate_backup_id_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let api = Arc::new(sales_api());
        let service = service(api.clone(), temp_dir.path());

        let ws = workspace("ws-1", "Sales Team");
        let taken_at = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let backup_id = BackupId::new(&ws.name, taken_at);
        let timestamp = taken_at.and_utc();

        let started = service
            .start_backup_as(ws.clone(), backup_id.clone(), timestamp)
            .await
            .unwrap();
        // 同一秒内的第二次请求
        let second = service
            .start_backup_as(ws.clone(), backup_id.clone(), timestamp)
            .await;
        assert!(matches!(second, Err(PbiError::Conflict(_))));
        assert_eq!(service.jobs.len(), 1);

        let mut job = service.jobs.get(&started.job_id).unwrap();
        for _ in 0..200 {
            if job.status.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            job = service.jobs.get(&started.job_id).unwrap();
        }
        assert_eq!(job.status, JobStatus::Completed);

        // 任务结束后，已写入的备份同样不会被覆盖
        let third = service.start_backup_as(ws, backup_id.clone(), timestamp).await;
        assert!(matches!(third, Err(PbiError::Conflict(_))));

        let exports = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::ExportReport(..)))
            .count();
        assert_eq!(exports, 2);
        let record = service.storage.load(&backup_id).await.unwrap();
        assert_eq!(record.reports[0].pbix_file.as_deref(), Some("reports/Revenue.pbix"));
    }
}
