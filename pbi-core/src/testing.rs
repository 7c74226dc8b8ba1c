//! 测试用的内存版 Power BI API

use crate::api::PowerBiApi;
use crate::error::{PbiError, Result};
use crate::models::{
    App, Dashboard, Dataflow, Dataset, ExtraFields, ImportInfo, ImportState, ImportedArtifact,
    RefreshSchedule, Report, Workspace,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// 记录下来的 API 调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListWorkspaces,
    GetWorkspace(String),
    ListReports(String),
    ListDatasets(String),
    ListDataflows(String),
    ListDashboards(String),
    ListApps,
    GetRefreshSchedule(String, String),
    UpdateRefreshSchedule(String, String),
    ExportReport(String, String),
    ImportPbix(String, String),
    GetImport(String, String),
}

impl ApiCall {
    /// 会修改目标工作区的调用
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::UpdateRefreshSchedule(..) | Self::ImportPbix(..))
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub workspaces: Vec<Workspace>,
    pub reports: HashMap<String, Vec<Report>>,
    pub datasets: HashMap<String, Vec<Dataset>>,
    pub dataflows: HashMap<String, Vec<Dataflow>>,
    pub dashboards: HashMap<String, Vec<Dashboard>>,
    pub apps: Vec<App>,
    pub schedules: HashMap<String, RefreshSchedule>,
    pub pbix: HashMap<String, Vec<u8>>,
    pub failing_exports: HashSet<String>,
    pub failing_schedule_updates: HashSet<String>,
    pub fail_dataflows: bool,
    pub stalled_imports: bool,
    pub imports: HashMap<String, ImportInfo>,
    pub updated_schedules: Vec<(String, String, RefreshSchedule)>,
    pub calls: Vec<ApiCall>,
    next_id: u32,
}

/// 内存版 API，记录每一次调用
#[derive(Debug, Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

pub fn workspace(id: &str, name: &str) -> Workspace {
    Workspace {
        id: id.to_string(),
        name: name.to_string(),
        workspace_type: Some("Workspace".to_string()),
        state: Some("Active".to_string()),
        capacity_id: None,
        extra: ExtraFields::new(),
    }
}

pub fn report(id: &str, name: &str) -> Report {
    Report {
        id: id.to_string(),
        name: name.to_string(),
        dataset_id: None,
        web_url: None,
        extra: ExtraFields::new(),
    }
}

pub fn dataset(id: &str, name: &str) -> Dataset {
    Dataset {
        id: id.to_string(),
        name: name.to_string(),
        is_refreshable: Some(true),
        configured_by: None,
        extra: ExtraFields::new(),
    }
}

pub fn dataflow(id: &str, name: &str) -> Dataflow {
    Dataflow {
        object_id: id.to_string(),
        name: name.to_string(),
        description: None,
        extra: ExtraFields::new(),
    }
}

pub fn dashboard(id: &str, name: &str) -> Dashboard {
    Dashboard {
        id: id.to_string(),
        display_name: name.to_string(),
        extra: ExtraFields::new(),
    }
}

pub fn app(id: &str, name: &str, workspace_id: &str) -> App {
    App {
        id: id.to_string(),
        name: name.to_string(),
        workspace_id: Some(workspace_id.to_string()),
        extra: ExtraFields::new(),
    }
}

pub fn schedule(enabled: bool, days: &[&str], times: &[&str]) -> RefreshSchedule {
    RefreshSchedule {
        enabled,
        days: days.iter().map(|d| d.to_string()).collect(),
        times: times.iter().map(|t| t.to_string()).collect(),
        local_time_zone_id: "UTC".to_string(),
        notify_option: "MailOnFailure".to_string(),
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_workspace(self, ws: Workspace) -> Self {
        self.with_state(|s| s.workspaces.push(ws))
    }

    pub fn with_report(self, workspace_id: &str, report: Report, pbix: &[u8]) -> Self {
        self.with_state(|s| {
            s.pbix.insert(report.id.clone(), pbix.to_vec());
            s.reports
                .entry(workspace_id.to_string())
                .or_default()
                .push(report);
        })
    }

    pub fn with_failing_export(self, report_id: &str) -> Self {
        self.with_state(|s| {
            s.failing_exports.insert(report_id.to_string());
        })
    }

    pub fn with_failing_schedule_update(self, dataset_id: &str) -> Self {
        self.with_state(|s| {
            s.failing_schedule_updates.insert(dataset_id.to_string());
        })
    }

    /// 导入任务一直停留在 Publishing 状态
    pub fn with_stalled_imports(self) -> Self {
        self.with_state(|s| s.stalled_imports = true)
    }

    pub fn with_dataset(
        self,
        workspace_id: &str,
        dataset: Dataset,
        schedule: Option<RefreshSchedule>,
    ) -> Self {
        self.with_state(|s| {
            if let Some(schedule) = schedule {
                s.schedules.insert(dataset.id.clone(), schedule);
            }
            s.datasets
                .entry(workspace_id.to_string())
                .or_default()
                .push(dataset);
        })
    }

    pub fn with_dataflow(self, workspace_id: &str, dataflow: Dataflow) -> Self {
        self.with_state(|s| {
            s.dataflows
                .entry(workspace_id.to_string())
                .or_default()
                .push(dataflow)
        })
    }

    pub fn with_failing_dataflows(self) -> Self {
        self.with_state(|s| s.fail_dataflows = true)
    }

    pub fn with_dashboard(self, workspace_id: &str, dashboard: Dashboard) -> Self {
        self.with_state(|s| {
            s.dashboards
                .entry(workspace_id.to_string())
                .or_default()
                .push(dashboard)
        })
    }

    pub fn with_app(self, app: App) -> Self {
        self.with_state(|s| s.apps.push(app))
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<ApiCall> {
        self.calls().into_iter().filter(ApiCall::is_mutating).collect()
    }

    pub fn updated_schedules(&self) -> Vec<(String, String, RefreshSchedule)> {
        self.state.lock().unwrap().updated_schedules.clone()
    }

    pub fn datasets_in(&self, workspace_id: &str) -> Vec<Dataset> {
        self.state
            .lock()
            .unwrap()
            .datasets
            .get(workspace_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: ApiCall) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl PowerBiApi for FakeApi {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        Ok(self.record(ApiCall::ListWorkspaces).workspaces.clone())
    }

    async fn get_workspace(&self, workspace_id: &str) -> Result<Workspace> {
        self.record(ApiCall::GetWorkspace(workspace_id.to_string()))
            .workspaces
            .iter()
            .find(|w| w.id == workspace_id)
            .cloned()
            .ok_or_else(|| PbiError::not_found(format!("工作区 {workspace_id}")))
    }

    async fn list_reports(&self, workspace_id: &str) -> Result<Vec<Report>> {
        let state = self.record(ApiCall::ListReports(workspace_id.to_string()));
        Ok(state.reports.get(workspace_id).cloned().unwrap_or_default())
    }

    async fn list_datasets(&self, workspace_id: &str) -> Result<Vec<Dataset>> {
        let state = self.record(ApiCall::ListDatasets(workspace_id.to_string()));
        Ok(state.datasets.get(workspace_id).cloned().unwrap_or_default())
    }

    async fn list_dataflows(&self, workspace_id: &str) -> Result<Vec<Dataflow>> {
        let state = self.record(ApiCall::ListDataflows(workspace_id.to_string()));
        if state.fail_dataflows {
            return Err(PbiError::api(400, "Dataflows are not supported"));
        }
        Ok(state.dataflows.get(workspace_id).cloned().unwrap_or_default())
    }

    async fn list_dashboards(&self, workspace_id: &str) -> Result<Vec<Dashboard>> {
        let state = self.record(ApiCall::ListDashboards(workspace_id.to_string()));
        Ok(state.dashboards.get(workspace_id).cloned().unwrap_or_default())
    }

    async fn list_apps(&self) -> Result<Vec<App>> {
        Ok(self.record(ApiCall::ListApps).apps.clone())
    }

    async fn get_refresh_schedule(
        &self,
        workspace_id: &str,
        dataset_id: &str,
    ) -> Result<RefreshSchedule> {
        let state = self.record(ApiCall::GetRefreshSchedule(
            workspace_id.to_string(),
            dataset_id.to_string(),
        ));
        state
            .schedules
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| PbiError::not_found(format!("数据集 {dataset_id} 的刷新计划")))
    }

    async fn update_refresh_schedule(
        &self,
        workspace_id: &str,
        dataset_id: &str,
        schedule: &RefreshSchedule,
    ) -> Result<()> {
        let mut state = self.record(ApiCall::UpdateRefreshSchedule(
            workspace_id.to_string(),
            dataset_id.to_string(),
        ));
        if state.failing_schedule_updates.contains(dataset_id) {
            return Err(PbiError::api(400, "Invalid schedule"));
        }
        state.updated_schedules.push((
            workspace_id.to_string(),
            dataset_id.to_string(),
            schedule.clone(),
        ));
        Ok(())
    }

    async fn export_report(&self, workspace_id: &str, report_id: &str) -> Result<Vec<u8>> {
        let state = self.record(ApiCall::ExportReport(
            workspace_id.to_string(),
            report_id.to_string(),
        ));
        if state.failing_exports.contains(report_id) {
            return Err(PbiError::api(403, "Export of this report is not allowed"));
        }
        state
            .pbix
            .get(report_id)
            .cloned()
            .ok_or_else(|| PbiError::not_found(format!("报表 {report_id}")))
    }

    async fn import_pbix(
        &self,
        workspace_id: &str,
        dataset_display_name: &str,
        _pbix: Vec<u8>,
    ) -> Result<ImportInfo> {
        let mut state = self.record(ApiCall::ImportPbix(
            workspace_id.to_string(),
            dataset_display_name.to_string(),
        ));
        state.next_id += 1;
        let n = state.next_id;

        let created = ImportedArtifact {
            id: format!("imported-dataset-{n}"),
            name: dataset_display_name.to_string(),
        };
        state
            .datasets
            .entry(workspace_id.to_string())
            .or_default()
            .push(dataset(&created.id, &created.name));

        let import_id = format!("import-{n}");
        state.imports.insert(
            import_id.clone(),
            ImportInfo {
                id: import_id.clone(),
                import_state: Some(ImportState::Succeeded),
                datasets: vec![created],
                reports: Vec::new(),
            },
        );

        Ok(ImportInfo {
            id: import_id,
            import_state: Some(ImportState::Publishing),
            datasets: Vec::new(),
            reports: Vec::new(),
        })
    }

    async fn get_import(&self, workspace_id: &str, import_id: &str) -> Result<ImportInfo> {
        let state = self.record(ApiCall::GetImport(
            workspace_id.to_string(),
            import_id.to_string(),
        ));
        if state.stalled_imports {
            return Ok(ImportInfo {
                id: import_id.to_string(),
                import_state: Some(ImportState::Publishing),
                datasets: Vec::new(),
                reports: Vec::new(),
            });
        }
        state
            .imports
            .get(import_id)
            .cloned()
            .ok_or_else(|| PbiError::not_found(format!("导入任务 {import_id}")))
    }
}
