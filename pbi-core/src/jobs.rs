use crate::backup::BackupSummary;
use crate::backup_id::BackupId;
use crate::error::{PbiError, Result};
use crate::restore::RestoreReport;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Backup,
    Restore,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 任务完成后的结果
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum JobResult {
    Backup(BackupSummary),
    Restore(RestoreReport),
}

/// 后台任务
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    /// 备份任务为源工作区，恢复任务为目标工作区
    pub workspace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<BackupId>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 任务表
///
/// 进程内共享，克隆后指向同一张表。任务只保存在内存中。
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<Uuid, Job>>,
    /// 备份ID -> 尚未结束的备份任务
    active_backups: Arc<DashMap<String, Uuid>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新任务，初始状态为 pending
    pub fn create(
        &self,
        kind: JobKind,
        workspace_id: impl Into<String>,
        backup_id: Option<BackupId>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(id, kind, workspace_id.into(), backup_id);
        id
    }

    /// 登记备份任务，同一备份ID同时只能有一个未结束的任务
    pub fn create_backup(
        &self,
        workspace_id: impl Into<String>,
        backup_id: BackupId,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        match self.active_backups.entry(backup_id.to_string()) {
            Entry::Occupied(entry) => {
                return Err(PbiError::conflict(format!(
                    "备份 {} 正在由任务 {} 执行",
                    backup_id,
                    entry.get()
                )));
            }
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        self.insert(id, JobKind::Backup, workspace_id.into(), Some(backup_id));
        Ok(id)
    }

    fn insert(&self, id: Uuid, kind: JobKind, workspace_id: String, backup_id: Option<BackupId>) {
        let now = Utc::now();
        let job = Job {
            id,
            kind,
            workspace_id,
            backup_id,
            status: JobStatus::Pending,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
        };

        debug!("登记任务 {} ({:?})", id, kind);
        self.jobs.insert(id, job);
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut Job)) {
        match self.jobs.get_mut(&id) {
            Some(mut job) => {
                apply(&mut job);
                job.updated_at = Utc::now();
            }
            None => warn!("任务不存在: {}", id),
        }
    }

    pub fn mark_in_progress(&self, id: Uuid) {
        self.update(id, |job| job.status = JobStatus::InProgress);
    }

    pub fn complete(&self, id: Uuid, result: JobResult) {
        self.update(id, |job| {
            job.status = JobStatus::Completed;
            job.result = Some(result);
        });
        self.release(id);
    }

    pub fn fail(&self, id: Uuid, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(message);
        });
        self.release(id);
    }

    fn release(&self, id: Uuid) {
        self.active_backups.retain(|_, job| *job != id);
    }

    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    /// 按任务ID排序的快照
    pub fn list(&self) -> BTreeMap<String, Job> {
        self.jobs
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> BackupSummary {
        BackupSummary {
            backup_id: "sales_20240115_093000".parse().unwrap(),
            reports: 2,
            reports_exported: 1,
            reports_failed: 1,
            datasets: 1,
            dataflows: 0,
            dashboards: 0,
            apps: 0,
            refresh_schedules: 1,
        }
    }

    #[test]
    fn test_job_lifecycle() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Backup, "ws-1", None);

        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.created_at, job.updated_at);

        registry.mark_in_progress(id);
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::InProgress);

        registry.complete(id, JobResult::Backup(summary()));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.status.is_finished());
        assert_eq!(job.result, Some(JobResult::Backup(summary())));
    }

    #[test]
    fn test_failed_job_keeps_message() {
        let registry = JobRegistry::new();
        let id = registry.create(
            JobKind::Restore,
            "ws-target",
            Some("sales_20240115_093000".parse().unwrap()),
        );
        registry.fail(id, "认证失败");

        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("认证失败"));
        assert!(job.result.is_none());
    }

    #[test]
    fn test_clones_share_state_and_list_is_keyed_by_id() {
        let registry = JobRegistry::new();
        let shared = registry.clone();
        let a = shared.create(JobKind::Backup, "ws-1", None);
        let b = shared.create(JobKind::Backup, "ws-2", None);

        assert_eq!(registry.len(), 2);
        let listed = registry.list();
        assert!(listed.contains_key(&a.to_string()));
        assert!(listed.contains_key(&b.to_string()));

        // 未知任务的更新被忽略
        registry.mark_in_progress(Uuid::new_v4());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_job_serialization() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Backup, "ws-1", None);
        registry.complete(id, JobResult::Backup(summary()));

        let value = serde_json::to_value(registry.get(&id).unwrap()).unwrap();
        assert_eq!(value["kind"], "backup");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["result"]["backup_id"], "sales_20240115_093000");
        assert_eq!(value["result"]["reports_failed"], 1);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_backup_id_is_claimed_until_job_finishes() {
        let registry = JobRegistry::new();
        let backup_id: BackupId = "sales_20240115_093000".parse().unwrap();

        let first = registry.create_backup("ws-1", backup_id.clone()).unwrap();
        assert!(matches!(
            registry.create_backup("ws-1", backup_id.clone()),
            Err(PbiError::Conflict(_))
        ));
        assert_eq!(registry.len(), 1);

        // 恢复任务不占用备份ID
        registry.create(JobKind::Restore, "ws-2", Some(backup_id.clone()));

        registry.fail(first, "网络错误");
        let second = registry.create_backup("ws-1", backup_id.clone()).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.get(&second).unwrap().backup_id, Some(backup_id));
    }
}
