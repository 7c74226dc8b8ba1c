use crate::api_config::ApiConfig;
use crate::authenticated_client::AuthenticatedClient;
use crate::error::Result;
use crate::models::{
    App, Dashboard, Dataflow, Dataset, ImportInfo, ODataList, RefreshSchedule, Report, Workspace,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Power BI REST API 的访问接口
///
/// 备份与恢复服务只依赖这个 trait，测试中使用内存实现替换。
#[async_trait]
pub trait PowerBiApi: Send + Sync {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>>;

    async fn get_workspace(&self, workspace_id: &str) -> Result<Workspace>;

    async fn list_reports(&self, workspace_id: &str) -> Result<Vec<Report>>;

    async fn list_datasets(&self, workspace_id: &str) -> Result<Vec<Dataset>>;

    async fn list_dataflows(&self, workspace_id: &str) -> Result<Vec<Dataflow>>;

    async fn list_dashboards(&self, workspace_id: &str) -> Result<Vec<Dashboard>>;

    /// 列出服务主体可见的全部应用，调用方按工作区过滤
    async fn list_apps(&self) -> Result<Vec<App>>;

    async fn get_refresh_schedule(
        &self,
        workspace_id: &str,
        dataset_id: &str,
    ) -> Result<RefreshSchedule>;

    async fn update_refresh_schedule(
        &self,
        workspace_id: &str,
        dataset_id: &str,
        schedule: &RefreshSchedule,
    ) -> Result<()>;

    /// 导出报表为 PBIX 二进制
    async fn export_report(&self, workspace_id: &str, report_id: &str) -> Result<Vec<u8>>;

    /// 上传 PBIX，返回导入任务
    async fn import_pbix(
        &self,
        workspace_id: &str,
        dataset_display_name: &str,
        pbix: Vec<u8>,
    ) -> Result<ImportInfo>;

    async fn get_import(&self, workspace_id: &str, import_id: &str) -> Result<ImportInfo>;
}

/// 刷新计划更新请求体
#[derive(Debug, Serialize)]
struct RefreshSchedulePatch<'a> {
    value: &'a RefreshSchedule,
}

/// API 客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: AuthenticatedClient,
    config: ApiConfig,
}

impl ApiClient {
    /// 创建新的 API 客户端
    pub fn new(http: AuthenticatedClient, config: ApiConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<T> {
        debug!("GET {}", url);
        let response = self.http.send(|client| client.get(url)).await?;
        let response = AuthenticatedClient::ensure_success(response, context).await?;
        Ok(response.json().await?)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<Vec<T>> {
        let list: ODataList<T> = self.get_json(url, context).await?;
        Ok(list.value)
    }
}

#[async_trait]
impl PowerBiApi for ApiClient {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let workspaces: Vec<Workspace> = self
            .get_list(&self.config.get_groups_url()?, "获取工作区列表")
            .await?;
        info!("找到 {} 个工作区", workspaces.len());
        Ok(workspaces)
    }

    async fn get_workspace(&self, workspace_id: &str) -> Result<Workspace> {
        self.get_json(
            &self.config.get_group_url(workspace_id)?,
            &format!("获取工作区 {workspace_id}"),
        )
        .await
    }

    async fn list_reports(&self, workspace_id: &str) -> Result<Vec<Report>> {
        self.get_list(&self.config.get_reports_url(workspace_id)?, "获取报表列表")
            .await
    }

    async fn list_datasets(&self, workspace_id: &str) -> Result<Vec<Dataset>> {
        self.get_list(&self.config.get_datasets_url(workspace_id)?, "获取数据集列表")
            .await
    }

    async fn list_dataflows(&self, workspace_id: &str) -> Result<Vec<Dataflow>> {
        self.get_list(&self.config.get_dataflows_url(workspace_id)?, "获取数据流列表")
            .await
    }

    async fn list_dashboards(&self, workspace_id: &str) -> Result<Vec<Dashboard>> {
        self.get_list(
            &self.config.get_dashboards_url(workspace_id)?,
            "获取仪表板列表",
        )
        .await
    }

    async fn list_apps(&self) -> Result<Vec<App>> {
        self.get_list(&self.config.get_apps_url()?, "获取应用列表")
            .await
    }

    async fn get_refresh_schedule(
        &self,
        workspace_id: &str,
        dataset_id: &str,
    ) -> Result<RefreshSchedule> {
        self.get_json(
            &self.config.get_refresh_schedule_url(workspace_id, dataset_id)?,
            &format!("获取数据集 {dataset_id} 的刷新计划"),
        )
        .await
    }

    async fn update_refresh_schedule(
        &self,
        workspace_id: &str,
        dataset_id: &str,
        schedule: &RefreshSchedule,
    ) -> Result<()> {
        let url = self.config.get_refresh_schedule_url(workspace_id, dataset_id)?;
        let body = RefreshSchedulePatch { value: schedule };

        let response = self
            .http
            .send(|client| client.patch(&url).json(&body))
            .await?;
        AuthenticatedClient::ensure_success(
            response,
            &format!("更新数据集 {dataset_id} 的刷新计划"),
        )
        .await?;
        Ok(())
    }

    async fn export_report(&self, workspace_id: &str, report_id: &str) -> Result<Vec<u8>> {
        let url = self.config.get_report_export_url(workspace_id, report_id)?;
        debug!("GET {}", url);

        let response = self.http.send(|client| client.get(&url)).await?;
        let response =
            AuthenticatedClient::ensure_success(response, &format!("导出报表 {report_id}"))
                .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn import_pbix(
        &self,
        workspace_id: &str,
        dataset_display_name: &str,
        pbix: Vec<u8>,
    ) -> Result<ImportInfo> {
        let url = self.config.get_imports_url(workspace_id)?;
        info!(
            "上传 PBIX: {} ({:.2} MB)",
            dataset_display_name,
            pbix.len() as f64 / 1024.0 / 1024.0
        );

        let response = self
            .http
            .send(|client| {
                // multipart 表单不可复用，每次发送都重新构造
                let part = Part::bytes(pbix.clone()).file_name("report.pbix");
                client
                    .post(&url)
                    .query(&[
                        ("datasetDisplayName", dataset_display_name),
                        ("nameConflict", "Abort"),
                    ])
                    .multipart(Form::new().part("file", part))
            })
            .await?;
        let response = AuthenticatedClient::ensure_success(
            response,
            &format!("导入 PBIX {dataset_display_name}"),
        )
        .await?;
        Ok(response.json().await?)
    }

    async fn get_import(&self, workspace_id: &str, import_id: &str) -> Result<ImportInfo> {
        self.get_json(
            &self.config.get_import_url(workspace_id, import_id)?,
            &format!("查询导入任务 {import_id}"),
        )
        .await
    }
}
