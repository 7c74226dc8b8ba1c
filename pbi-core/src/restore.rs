use crate::api::PowerBiApi;
use crate::backup::BackupSummary;
use crate::backup_id::BackupId;
use crate::config::RestoreConfig;
use crate::error::{PbiError, Result};
use crate::jobs::{JobKind, JobRegistry, JobResult};
use crate::models::{BackupRecord, Dataset, ExportStatus, ImportInfo, ImportState};
use crate::storage::BackupStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 可恢复的组件类型，顺序即恢复顺序
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Reports,
    Datasets,
    RefreshSchedules,
    Dashboards,
    Dataflows,
    Apps,
}

impl ComponentKind {
    pub const RESTORE_ORDER: [ComponentKind; 6] = [
        Self::Reports,
        Self::Datasets,
        Self::RefreshSchedules,
        Self::Dashboards,
        Self::Dataflows,
        Self::Apps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reports => "reports",
            Self::Datasets => "datasets",
            Self::RefreshSchedules => "refresh_schedules",
            Self::Dashboards => "dashboards",
            Self::Dataflows => "dataflows",
            Self::Apps => "apps",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 选择要恢复的组件
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentSelection {
    #[serde(default)]
    pub reports: bool,
    #[serde(default)]
    pub datasets: bool,
    #[serde(default)]
    pub refresh_schedules: bool,
    #[serde(default)]
    pub dashboards: bool,
    #[serde(default)]
    pub dataflows: bool,
    #[serde(default)]
    pub apps: bool,
}

impl ComponentSelection {
    pub fn all() -> Self {
        Self {
            reports: true,
            datasets: true,
            refresh_schedules: true,
            dashboards: true,
            dataflows: true,
            apps: true,
        }
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Reports => self.reports,
            ComponentKind::Datasets => self.datasets,
            ComponentKind::RefreshSchedules => self.refresh_schedules,
            ComponentKind::Dashboards => self.dashboards,
            ComponentKind::Dataflows => self.dataflows,
            ComponentKind::Apps => self.apps,
        }
    }

    /// 按恢复顺序列出已选组件
    pub fn selected(&self) -> Vec<ComponentKind> {
        ComponentKind::RESTORE_ORDER
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected().is_empty()
    }

    fn ensure_not_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(PbiError::validation("至少需要选择一个要恢复的组件"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Restored,
    Skipped,
    Failed,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemOutcome {
    pub name: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 单个组件的恢复结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentReport {
    pub component: ComponentKind,
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub manual: usize,
    pub items: Vec<ItemOutcome>,
}

impl ComponentReport {
    fn new(component: ComponentKind) -> Self {
        Self {
            component,
            restored: 0,
            skipped: 0,
            failed: 0,
            manual: 0,
            items: Vec::new(),
        }
    }

    fn push(&mut self, name: impl Into<String>, status: ItemStatus, detail: Option<String>) {
        match status {
            ItemStatus::Restored => self.restored += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Manual => self.manual += 1,
        }
        self.items.push(ItemOutcome {
            name: name.into(),
            status,
            detail,
        });
    }
}

/// 恢复结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestoreReport {
    pub backup_id: BackupId,
    pub target_workspace_id: String,
    pub components: Vec<ComponentReport>,
    /// 原数据集名称 -> 目标工作区中新建的数据集ID
    pub dataset_id_mapping: BTreeMap<String, String>,
}

impl RestoreReport {
    pub fn component(&self, kind: ComponentKind) -> Option<&ComponentReport> {
        self.components.iter().find(|c| c.component == kind)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanEntry {
    pub component: ComponentKind,
    pub count: usize,
    pub description: String,
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RestorationSummary {
    pub total_items: usize,
    pub automatically_restorable: usize,
    pub manual_steps_required: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AutomaticRestoration {
    pub can_restore: Vec<PlanEntry>,
    pub manual_restoration_required: Vec<PlanEntry>,
}

/// 恢复计划
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RestorationPlan {
    pub backup_id: BackupId,
    pub target_workspace_id: String,
    pub restoration_summary: RestorationSummary,
    pub automatic_restoration: AutomaticRestoration,
    pub step_by_step_guide: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeaturesBackedUp {
    pub reports: bool,
    pub pbix_files: bool,
    pub datasets: bool,
    pub refresh_schedules: bool,
    pub dashboards: bool,
    pub dataflows: bool,
    pub apps: bool,
}

/// 恢复指南
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RestorationGuide {
    pub backup_id: BackupId,
    pub workspace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub backup_summary: BackupSummary,
    pub features_backed_up: FeaturesBackedUp,
    pub restoration_steps: Vec<String>,
}

const DATASET_INSTRUCTIONS: &[&str] = &[
    "数据集随 PBIX 导入自动创建",
    "在目标工作区重新配置数据集参数和数据源凭据",
    "重新绑定网关",
];

const DASHBOARD_INSTRUCTIONS: &[&str] = &[
    "参考备份中的仪表板元数据",
    "在目标工作区重新创建仪表板",
    "从已导入的报表固定磁贴",
];

const DATAFLOW_INSTRUCTIONS: &[&str] = &[
    "参考备份中的数据流元数据",
    "在目标工作区重新创建数据流",
    "配置数据源",
];

const APP_INSTRUCTIONS: &[&str] = &[
    "在目标工作区中重新发布应用",
    "重新配置应用的访问权限",
];

const FAILED_EXPORT_INSTRUCTIONS: &[&str] = &[
    "在源工作区中用 Power BI Desktop 下载报表",
    "手动上传 PBIX 到目标工作区",
];

fn to_strings(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

fn manual_detail(lines: &[&str]) -> Option<String> {
    Some(lines.join("；"))
}

/// 分析备份，给出可自动恢复和需要手动处理的组件，不调用任何 API
pub fn build_plan(record: &BackupRecord, target_workspace_id: &str) -> RestorationPlan {
    let exports = record.export_summary();
    let restorable_schedules = record
        .refresh_schedules
        .iter()
        .filter(|s| s.schedule.is_restorable())
        .count();

    let mut can_restore = Vec::new();
    let mut manual = Vec::new();

    if exports.successful > 0 {
        can_restore.push(PlanEntry {
            component: ComponentKind::Reports,
            count: exports.successful,
            description: "已导出的 PBIX 报表将导入目标工作区".to_string(),
            instructions: to_strings(&[
                "上传备份中的 PBIX 文件",
                "等待导入完成",
                "数据集随导入自动创建",
            ]),
        });
    }
    if restorable_schedules > 0 {
        can_restore.push(PlanEntry {
            component: ComponentKind::RefreshSchedules,
            count: restorable_schedules,
            description: "数据集刷新计划".to_string(),
            instructions: to_strings(&["按数据集名称匹配目标工作区中的数据集并写入刷新计划"]),
        });
    }

    let manual_components = [
        (
            ComponentKind::Reports,
            exports.failed,
            "导出失败的报表",
            FAILED_EXPORT_INSTRUCTIONS,
        ),
        (
            ComponentKind::Datasets,
            record.datasets.len(),
            "数据集配置（参数、网关、凭据）",
            DATASET_INSTRUCTIONS,
        ),
        (
            ComponentKind::Dashboards,
            record.dashboards.len(),
            "仪表板",
            DASHBOARD_INSTRUCTIONS,
        ),
        (
            ComponentKind::Dataflows,
            record.dataflows.len(),
            "数据流",
            DATAFLOW_INSTRUCTIONS,
        ),
        (ComponentKind::Apps, record.apps.len(), "应用", APP_INSTRUCTIONS),
    ];
    for (component, count, description, instructions) in manual_components {
        if count > 0 {
            manual.push(PlanEntry {
                component,
                count,
                description: description.to_string(),
                instructions: to_strings(instructions),
            });
        }
    }

    let mut steps = Vec::new();
    for entry in &can_restore {
        steps.push(format!("自动恢复 {} 个{}", entry.count, entry.description));
    }
    for entry in &manual {
        steps.push(format!(
            "手动处理 {} 个{}: {}",
            entry.count,
            entry.description,
            entry.instructions.join("，")
        ));
    }
    steps.push("在目标工作区中检查所有报表和仪表板".to_string());
    let step_by_step_guide = steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| format!("步骤 {}: {}", i + 1, step))
        .collect();

    let total_items = record.reports.len()
        + record.datasets.len()
        + record.refresh_schedules.len()
        + record.dashboards.len()
        + record.dataflows.len()
        + record.apps.len();

    RestorationPlan {
        backup_id: record.backup_id.clone(),
        target_workspace_id: target_workspace_id.to_string(),
        restoration_summary: RestorationSummary {
            total_items,
            automatically_restorable: can_restore.iter().map(|e| e.count).sum(),
            manual_steps_required: manual.iter().map(|e| e.count).sum(),
        },
        automatic_restoration: AutomaticRestoration {
            can_restore,
            manual_restoration_required: manual,
        },
        step_by_step_guide,
    }
}

/// 生成备份的恢复指南
pub fn build_guide(record: &BackupRecord) -> RestorationGuide {
    let summary = BackupSummary::from_record(record);

    let mut steps = vec![
        "1. 创建或选择目标工作区".to_string(),
        "2. 将备份中的 PBIX 文件导入目标工作区".to_string(),
        "3. 数据集随 PBIX 导入自动创建，重新配置参数和网关".to_string(),
        "4. 恢复数据集刷新计划".to_string(),
        "5. 参考备份元数据重新创建仪表板、数据流和应用".to_string(),
        "6. 在目标工作区中检查所有报表和仪表板".to_string(),
    ];
    if summary.reports_failed > 0 {
        steps.push(format!(
            "注意: {} 个报表导出失败，需要手动下载 PBIX",
            summary.reports_failed
        ));
    }
    if record.datasets.is_empty() {
        steps.push("注意: 备份中没有数据集".to_string());
    }

    RestorationGuide {
        backup_id: record.backup_id.clone(),
        workspace_id: record.workspace_id.clone(),
        workspace_name: record.workspace_name().map(str::to_string),
        timestamp: record.timestamp,
        features_backed_up: FeaturesBackedUp {
            reports: summary.reports > 0,
            pbix_files: summary.reports_exported > 0,
            datasets: summary.datasets > 0,
            refresh_schedules: summary.refresh_schedules > 0,
            dashboards: summary.dashboards > 0,
            dataflows: summary.dataflows > 0,
            apps: summary.apps > 0,
        },
        backup_summary: summary,
        restoration_steps: steps,
    }
}

/// 在已占用的名称中选出不冲突的数据集名称：`name`、`name_1`、`name_2`……
fn unique_dataset_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// 恢复服务
#[derive(Clone)]
pub struct RestoreService {
    api: Arc<dyn PowerBiApi>,
    storage: BackupStorage,
    jobs: JobRegistry,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl RestoreService {
    pub fn new(
        api: Arc<dyn PowerBiApi>,
        storage: BackupStorage,
        jobs: JobRegistry,
        config: &RestoreConfig,
    ) -> Self {
        Self {
            api,
            storage,
            jobs,
            poll_interval: Duration::from_secs(config.import_poll_interval_secs),
            poll_max_attempts: config.import_poll_max_attempts.max(1),
        }
    }

    /// 受理恢复请求并在后台执行
    pub async fn start_restore(
        &self,
        backup_id: &BackupId,
        target_workspace_id: &str,
        selection: ComponentSelection,
    ) -> Result<Uuid> {
        selection.ensure_not_empty()?;
        let record = self.storage.load(backup_id).await?;
        // 目标工作区不存在或无权访问时直接拒绝请求
        self.api.get_workspace(target_workspace_id).await?;

        let job_id = self.jobs.create(
            JobKind::Restore,
            target_workspace_id,
            Some(backup_id.clone()),
        );
        info!(
            "♻️ 开始恢复备份 {} 到工作区 {}，组件: {:?}",
            backup_id,
            target_workspace_id,
            selection.selected()
        );

        let service = self.clone();
        let target = target_workspace_id.to_string();
        tokio::spawn(async move {
            service.jobs.mark_in_progress(job_id);
            match service.run_restore(&record, &target, selection).await {
                Ok(report) => service.jobs.complete(job_id, JobResult::Restore(report)),
                Err(e) => {
                    error!("❌ 恢复任务 {} 失败: {}", job_id, e);
                    service.jobs.fail(job_id, e.to_string());
                }
            }
        });

        Ok(job_id)
    }

    /// 在当前任务中执行恢复
    pub async fn restore_now(
        &self,
        backup_id: &BackupId,
        target_workspace_id: &str,
        selection: ComponentSelection,
    ) -> Result<RestoreReport> {
        selection.ensure_not_empty()?;
        let record = self.storage.load(backup_id).await?;
        self.api.get_workspace(target_workspace_id).await?;
        self.run_restore(&record, target_workspace_id, selection)
            .await
    }

    pub async fn plan(&self, backup_id: &BackupId, target_workspace_id: &str) -> Result<RestorationPlan> {
        let record = self.storage.load(backup_id).await?;
        Ok(build_plan(&record, target_workspace_id))
    }

    pub async fn guide(&self, backup_id: &BackupId) -> Result<RestorationGuide> {
        let record = self.storage.load(backup_id).await?;
        Ok(build_guide(&record))
    }

    /// 按固定顺序恢复所选组件，单个条目的失败不会中断恢复
    pub async fn run_restore(
        &self,
        record: &BackupRecord,
        target: &str,
        selection: ComponentSelection,
    ) -> Result<RestoreReport> {
        selection.ensure_not_empty()?;

        let mut report = RestoreReport {
            backup_id: record.backup_id.clone(),
            target_workspace_id: target.to_string(),
            components: Vec::new(),
            dataset_id_mapping: BTreeMap::new(),
        };

        for kind in selection.selected() {
            info!("恢复组件: {}", kind);
            let component = match kind {
                ComponentKind::Reports => {
                    self.restore_reports(record, target, &mut report.dataset_id_mapping)
                        .await
                }
                ComponentKind::Datasets => self.restore_datasets(record, target).await,
                ComponentKind::RefreshSchedules => {
                    self.restore_refresh_schedules(record, target, &report.dataset_id_mapping)
                        .await
                }
                ComponentKind::Dashboards => manual_component(
                    kind,
                    record.dashboards.iter().map(|d| d.display_name.as_str()),
                    DASHBOARD_INSTRUCTIONS,
                ),
                ComponentKind::Dataflows => manual_component(
                    kind,
                    record.dataflows.iter().map(|d| d.name.as_str()),
                    DATAFLOW_INSTRUCTIONS,
                ),
                ComponentKind::Apps => manual_component(
                    kind,
                    record.apps.iter().map(|a| a.name.as_str()),
                    APP_INSTRUCTIONS,
                ),
            };
            info!(
                "组件 {} 完成: 恢复 {}, 跳过 {}, 失败 {}, 需手动 {}",
                kind, component.restored, component.skipped, component.failed, component.manual
            );
            report.components.push(component);
        }

        Ok(report)
    }

    /// 目标工作区中的数据集，查询失败时按空列表处理
    async fn target_datasets(&self, target: &str) -> Vec<Dataset> {
        self.api.list_datasets(target).await.unwrap_or_else(|e| {
            warn!("⚠️ 获取目标工作区数据集失败: {}", e);
            Vec::new()
        })
    }

    async fn restore_reports(
        &self,
        record: &BackupRecord,
        target: &str,
        mapping: &mut BTreeMap<String, String>,
    ) -> ComponentReport {
        let mut component = ComponentReport::new(ComponentKind::Reports);
        if record.reports.is_empty() {
            return component;
        }

        let mut taken: HashSet<String> = self
            .target_datasets(target)
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();

        for exported in &record.reports {
            let name = exported.report.name.as_str();
            let pbix_file = match (&exported.export_status, &exported.pbix_file) {
                (ExportStatus::Success, Some(path)) => path,
                (ExportStatus::Failed { reason }, _) => {
                    component.push(
                        name,
                        ItemStatus::Skipped,
                        Some(format!("备份时导出失败: {reason}")),
                    );
                    continue;
                }
                (ExportStatus::Success, None) => {
                    component.push(name, ItemStatus::Skipped, Some("备份中没有 PBIX 文件".into()));
                    continue;
                }
            };

            // 数据集名称取自报表绑定的数据集，找不到时使用报表名称
            let original_dataset = exported
                .report
                .dataset_id
                .as_deref()
                .and_then(|id| record.datasets.iter().find(|d| d.id == id))
                .map(|d| d.name.as_str())
                .unwrap_or(name);
            let display_name = unique_dataset_name(original_dataset, &taken);

            match self
                .import_report(&record.backup_id, target, pbix_file, &display_name)
                .await
            {
                Ok(dataset_id) => {
                    taken.insert(display_name.clone());
                    mapping.insert(original_dataset.to_string(), dataset_id.clone());
                    component.push(
                        name,
                        ItemStatus::Restored,
                        Some(format!("数据集 {display_name} ({dataset_id})")),
                    );
                }
                Err(e) => {
                    warn!("⚠️ 报表 {} 导入失败: {}", name, e);
                    component.push(name, ItemStatus::Failed, Some(e.to_string()));
                }
            }
        }

        component
    }

    /// 上传 PBIX 并等待导入完成，返回新数据集ID
    async fn import_report(
        &self,
        backup_id: &BackupId,
        target: &str,
        pbix_file: &str,
        display_name: &str,
    ) -> Result<String> {
        let bytes = self.storage.read_pbix(backup_id, pbix_file).await?;
        let started = self.api.import_pbix(target, display_name, bytes).await?;
        let finished = self.wait_for_import(target, &started.id).await?;

        finished
            .datasets
            .first()
            .map(|d| d.id.clone())
            .ok_or_else(|| PbiError::import(format!("导入 {} 完成但没有返回数据集", started.id)))
    }

    async fn wait_for_import(&self, target: &str, import_id: &str) -> Result<ImportInfo> {
        for attempt in 1..=self.poll_max_attempts {
            let info = self.api.get_import(target, import_id).await?;
            match info.import_state {
                Some(ImportState::Succeeded) => return Ok(info),
                Some(ImportState::Failed) => {
                    return Err(PbiError::import(format!("导入任务 {import_id} 失败")));
                }
                state => {
                    debug!(
                        "导入任务 {} 状态 {:?} (第 {}/{} 次查询)",
                        import_id, state, attempt, self.poll_max_attempts
                    );
                    if attempt < self.poll_max_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }

        Err(PbiError::import(format!(
            "导入任务 {import_id} 在 {} 次查询后仍未完成",
            self.poll_max_attempts
        )))
    }

    async fn restore_datasets(&self, record: &BackupRecord, target: &str) -> ComponentReport {
        let mut component = ComponentReport::new(ComponentKind::Datasets);
        if record.datasets.is_empty() {
            return component;
        }

        let existing: HashSet<String> = self
            .target_datasets(target)
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();

        for dataset in &record.datasets {
            if existing.contains(&dataset.name) {
                component.push(
                    &dataset.name,
                    ItemStatus::Skipped,
                    Some("目标工作区已存在同名数据集".into()),
                );
            } else {
                component.push(
                    &dataset.name,
                    ItemStatus::Manual,
                    manual_detail(DATASET_INSTRUCTIONS),
                );
            }
        }

        component
    }

    async fn restore_refresh_schedules(
        &self,
        record: &BackupRecord,
        target: &str,
        mapping: &BTreeMap<String, String>,
    ) -> ComponentReport {
        let mut component = ComponentReport::new(ComponentKind::RefreshSchedules);

        // 没有可恢复的计划时不查询目标工作区
        let needs_lookup = record
            .refresh_schedules
            .iter()
            .any(|s| s.schedule.is_restorable() && !mapping.contains_key(&s.dataset_name));
        let target_datasets = if needs_lookup {
            self.target_datasets(target).await
        } else {
            Vec::new()
        };

        for entry in &record.refresh_schedules {
            let name = entry.dataset_name.as_str();
            if !entry.schedule.is_restorable() {
                debug!("刷新计划 {} 未启用或缺少星期/时间，跳过", name);
                component.push(
                    name,
                    ItemStatus::Skipped,
                    Some("计划未启用或未配置星期和时间".into()),
                );
                continue;
            }

            let dataset_id = mapping.get(name).cloned().or_else(|| {
                target_datasets
                    .iter()
                    .find(|d| d.name == name)
                    .map(|d| d.id.clone())
            });
            let Some(dataset_id) = dataset_id else {
                component.push(
                    name,
                    ItemStatus::Skipped,
                    Some("目标工作区中没有对应的数据集".into()),
                );
                continue;
            };

            let mut schedule = entry.schedule.clone();
            schedule.enabled = true;
            match self
                .api
                .update_refresh_schedule(target, &dataset_id, &schedule)
                .await
            {
                Ok(()) => component.push(
                    name,
                    ItemStatus::Restored,
                    Some(format!("数据集 {dataset_id}")),
                ),
                Err(e) => {
                    warn!("⚠️ 刷新计划 {} 更新失败: {}", name, e);
                    component.push(name, ItemStatus::Failed, Some(e.to_string()));
                }
            }
        }

        component
    }
}

/// 无法通过 API 重建的组件，逐项标记为需要手动处理
fn manual_component<'a>(
    kind: ComponentKind,
    names: impl Iterator<Item = &'a str>,
    instructions: &[&str],
) -> ComponentReport {
    let mut component = ComponentReport::new(kind);
    for name in names {
        component.push(name, ItemStatus::Manual, manual_detail(instructions));
    }
    component
}
