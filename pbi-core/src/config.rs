use crate::constants::{backup, config, env, http, powerbi, restore, server};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub powerbi: PowerBiConfig,
    pub backup: BackupConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub restore: RestoreConfig,
}

/// Power BI 服务主体配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PowerBiConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_resource")]
    pub resource: String,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackupConfig {
    pub storage_dir: String,
}

/// HTTP 服务配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

/// HTTP 客户端配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

/// 恢复相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RestoreConfig {
    pub import_poll_interval_secs: u64,
    pub import_poll_max_attempts: u32,
}

fn default_api_base_url() -> String {
    powerbi::DEFAULT_API_BASE_URL.to_string()
}

fn default_authority_url() -> String {
    powerbi::DEFAULT_AUTHORITY_URL.to_string()
}

fn default_resource() -> String {
    powerbi::DEFAULT_RESOURCE.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: server::DEFAULT_HOST.to_string(),
            port: server::DEFAULT_PORT,
            static_dir: server::DEFAULT_STATIC_DIR.to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: http::DEFAULT_TIMEOUT,
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            import_poll_interval_secs: restore::DEFAULT_IMPORT_POLL_INTERVAL_SECS,
            import_poll_max_attempts: restore::DEFAULT_IMPORT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            powerbi: PowerBiConfig {
                client_id: String::new(),
                client_secret: String::new(),
                tenant_id: String::new(),
                api_base_url: default_api_base_url(),
                authority_url: default_authority_url(),
                resource: default_resource(),
            },
            backup: BackupConfig {
                storage_dir: backup::get_default_storage_dir()
                    .to_string_lossy()
                    .to_string(),
            },
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            restore: RestoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置：优先使用指定路径，其次按优先级查找
    /// config.toml -> pbi-backup.toml -> .pbi-backup.toml，
    /// 都不存在时生成默认配置。最后应用环境变量覆盖。
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            tracing::info!("使用配置文件: {}", path.display());
            Self::load_from_file(path)?
        } else {
            Self::find_and_load_config()?
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 智能查找并加载配置文件
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_FILE_CANDIDATES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        tracing::warn!(
            "未找到配置文件，创建默认配置: {}",
            config::DEFAULT_CONFIG_FILE
        );
        let default_config = Self::default();
        default_config.save_to_file(config::DEFAULT_CONFIG_FILE)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 用环境变量覆盖配置文件中的值
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(env::CLIENT_ID) {
            self.powerbi.client_id = v;
        }
        if let Some(v) = non_empty(env::CLIENT_SECRET) {
            self.powerbi.client_secret = v;
        }
        if let Some(v) = non_empty(env::TENANT_ID) {
            self.powerbi.tenant_id = v;
        }
        if let Some(v) = non_empty(env::API_BASE_URL) {
            self.powerbi.api_base_url = v;
        }
        if let Some(v) = non_empty(env::BACKUP_PATH) {
            self.backup.storage_dir = v;
        }
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{client_id}", &self.powerbi.client_id)
            .replace("{client_secret}", &self.powerbi.client_secret)
            .replace("{tenant_id}", &self.powerbi.tenant_id)
            .replace("{api_base_url}", &self.powerbi.api_base_url)
            .replace("{authority_url}", &self.powerbi.authority_url)
            .replace("{resource}", &self.powerbi.resource)
            .replace("{backup_storage_dir}", &self.backup.storage_dir)
            .replace("{server_host}", &self.server.host)
            .replace("{server_port}", &self.server.port.to_string())
            .replace("{static_dir}", &self.server.static_dir)
            .replace("{timeout_secs}", &self.http.timeout_secs.to_string())
            .replace(
                "{import_poll_interval_secs}",
                &self.restore.import_poll_interval_secs.to_string(),
            )
            .replace(
                "{import_poll_max_attempts}",
                &self.restore.import_poll_max_attempts.to_string(),
            )
    }

    /// 确保备份目录存在
    pub fn ensure_backup_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.backup.storage_dir)?;
        Ok(())
    }

    /// 获取备份目录路径
    pub fn get_backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.backup.storage_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_round_trips_through_template() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = AppConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let content = r#"
            [powerbi]
            client_id = "abc"

            [backup]
            storage_dir = "/tmp/pbi"
        "#;
        let config: AppConfig = toml::from_str(content).unwrap();

        assert_eq!(config.powerbi.client_id, "abc");
        assert_eq!(config.powerbi.api_base_url, powerbi::DEFAULT_API_BASE_URL);
        assert_eq!(config.server.port, server::DEFAULT_PORT);
        assert_eq!(
            config.restore.import_poll_max_attempts,
            restore::DEFAULT_IMPORT_POLL_MAX_ATTEMPTS
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (env::CLIENT_ID, "env-client"),
            (env::CLIENT_SECRET, "env-secret"),
            (env::TENANT_ID, "  "),
            (env::BACKUP_PATH, "/data/backups"),
        ]);

        let mut config = AppConfig::default();
        config.powerbi.tenant_id = "file-tenant".to_string();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.powerbi.client_id, "env-client");
        assert_eq!(config.powerbi.client_secret, "env-secret");
        // 空白值不覆盖
        assert_eq!(config.powerbi.tenant_id, "file-tenant");
        assert_eq!(config.backup.storage_dir, "/data/backups");
    }
}
