//! API配置模块 - Power BI REST 端点配置

use crate::constants::powerbi;
use crate::error::{PbiError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// API端点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoints {
    /// 工作区列表端点
    pub groups: String,
    /// 单个工作区端点
    pub group: String,
    /// 报表列表端点
    pub reports: String,
    /// 报表导出端点
    pub report_export: String,
    /// 数据集列表端点
    pub datasets: String,
    /// 刷新计划端点
    pub refresh_schedule: String,
    /// 数据流列表端点
    pub dataflows: String,
    /// 仪表板列表端点
    pub dashboards: String,
    /// 应用列表端点
    pub apps: String,
    /// PBIX 导入端点
    pub imports: String,
    /// 导入状态端点
    pub import: String,
}

/// API配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 基础URL
    pub base_url: String,
    /// API端点
    pub endpoints: ApiEndpoints,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::with_base_url(powerbi::DEFAULT_API_BASE_URL)
    }
}

impl ApiConfig {
    /// 使用指定的基础URL创建配置
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        use powerbi::endpoints;

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints: ApiEndpoints {
                groups: endpoints::GROUPS.to_string(),
                group: endpoints::GROUP.to_string(),
                reports: endpoints::REPORTS.to_string(),
                report_export: endpoints::REPORT_EXPORT.to_string(),
                datasets: endpoints::DATASETS.to_string(),
                refresh_schedule: endpoints::REFRESH_SCHEDULE.to_string(),
                dataflows: endpoints::DATAFLOWS.to_string(),
                dashboards: endpoints::DASHBOARDS.to_string(),
                apps: endpoints::APPS.to_string(),
                imports: endpoints::IMPORTS.to_string(),
                import: endpoints::IMPORT.to_string(),
            },
        }
    }

    /// 将端点模板展开为完整URL
    ///
    /// `{name}` 占位符按单个路径段替换并做百分号编码，取值中的 `/`、`?`、`#` 不会改变请求路径。
    pub fn build_url(&self, template: &str, params: &[(&str, &str)]) -> Result<String> {
        let invalid_base = || PbiError::custom(format!("无效的 API 地址: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid_base())?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| invalid_base())?;
            for segment in template.split('/').filter(|s| !s.is_empty()) {
                let value = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => {
                        let value = params
                            .iter()
                            .find(|(key, _)| *key == name)
                            .map(|(_, value)| *value)
                            .ok_or_else(|| {
                                PbiError::custom(format!("端点 {template} 缺少参数 {name}"))
                            })?;
                        validate_segment(name, value)?;
                        value
                    }
                    None => segment,
                };
                segments.push(value);
            }
        }
        Ok(url.to_string())
    }

    pub fn get_groups_url(&self) -> Result<String> {
        self.build_url(&self.endpoints.groups, &[])
    }

    pub fn get_group_url(&self, workspace_id: &str) -> Result<String> {
        self.build_url(&self.endpoints.group, &[("workspace_id", workspace_id)])
    }

    pub fn get_reports_url(&self, workspace_id: &str) -> Result<String> {
        self.build_url(&self.endpoints.reports, &[("workspace_id", workspace_id)])
    }

    pub fn get_report_export_url(&self, workspace_id: &str, report_id: &str) -> Result<String> {
        self.build_url(
            &self.endpoints.report_export,
            &[("workspace_id", workspace_id), ("report_id", report_id)],
        )
    }

    pub fn get_datasets_url(&self, workspace_id: &str) -> Result<String> {
        self.build_url(&self.endpoints.datasets, &[("workspace_id", workspace_id)])
    }

    pub fn get_refresh_schedule_url(&self, workspace_id: &str, dataset_id: &str) -> Result<String> {
        self.build_url(
            &self.endpoints.refresh_schedule,
            &[("workspace_id", workspace_id), ("dataset_id", dataset_id)],
        )
    }

    pub fn get_dataflows_url(&self, workspace_id: &str) -> Result<String> {
        self.build_url(&self.endpoints.dataflows, &[("workspace_id", workspace_id)])
    }

    pub fn get_dashboards_url(&self, workspace_id: &str) -> Result<String> {
        self.build_url(&self.endpoints.dashboards, &[("workspace_id", workspace_id)])
    }

    pub fn get_apps_url(&self) -> Result<String> {
        self.build_url(&self.endpoints.apps, &[])
    }

    pub fn get_imports_url(&self, workspace_id: &str) -> Result<String> {
        self.build_url(&self.endpoints.imports, &[("workspace_id", workspace_id)])
    }

    pub fn get_import_url(&self, workspace_id: &str, import_id: &str) -> Result<String> {
        self.build_url(
            &self.endpoints.import,
            &[("workspace_id", workspace_id), ("import_id", import_id)],
        )
    }
}

/// 空值以及 `.`、`..` 无法作为路径段安全编码
fn validate_segment(name: &str, value: &str) -> Result<()> {
    if matches!(value.trim(), "" | "." | "..") {
        return Err(PbiError::validation(format!("无效的 {name}: {value:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_placeholders() {
        let config = ApiConfig::with_base_url("https://example.test/v1.0/myorg/");

        assert_eq!(
            config.get_groups_url().unwrap(),
            "https://example.test/v1.0/myorg/groups"
        );
        assert_eq!(
            config.get_reports_url("ws-1").unwrap(),
            "https://example.test/v1.0/myorg/groups/ws-1/reports"
        );
        assert_eq!(
            config.get_report_export_url("ws-1", "r-9").unwrap(),
            "https://example.test/v1.0/myorg/groups/ws-1/reports/r-9/Export"
        );
        assert_eq!(
            config.get_refresh_schedule_url("ws-1", "d-2").unwrap(),
            "https://example.test/v1.0/myorg/groups/ws-1/datasets/d-2/refreshSchedule"
        );
        assert_eq!(
            config.get_import_url("ws-1", "imp-3").unwrap(),
            "https://example.test/v1.0/myorg/groups/ws-1/imports/imp-3"
        );
        assert_eq!(
            config.get_apps_url().unwrap(),
            "https://example.test/v1.0/myorg/apps"
        );
    }

    #[test]
    fn test_ids_cannot_escape_their_path_segment() {
        let config = ApiConfig::with_base_url("https://example.test/v1.0/myorg");

        assert_eq!(
            config.get_group_url("ws/../../apps?x=1#frag").unwrap(),
            "https://example.test/v1.0/myorg/groups/ws%2F..%2F..%2Fapps%3Fx=1%23frag"
        );
        assert_eq!(
            config.get_refresh_schedule_url("ws 1", "d%2F2").unwrap(),
            "https://example.test/v1.0/myorg/groups/ws%201/datasets/d%252F2/refreshSchedule"
        );

        for bad in ["", " ", ".", ".."] {
            assert!(matches!(
                config.get_reports_url(bad),
                Err(PbiError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_base_url_without_path() {
        let config = ApiConfig::with_base_url("http://127.0.0.1:8080");
        assert_eq!(
            config.get_import_url("ws-1", "imp-3").unwrap(),
            "http://127.0.0.1:8080/groups/ws-1/imports/imp-3"
        );
    }
}
