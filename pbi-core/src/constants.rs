/// Power BI 服务相关常量
pub mod powerbi {
    /// 默认 REST API 地址
    pub const DEFAULT_API_BASE_URL: &str = "https://api.powerbi.com/v1.0/myorg";

    /// 默认认证服务地址
    pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";

    /// 令牌申请的资源标识
    pub const DEFAULT_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";

    /// 令牌提前刷新的余量（秒）
    pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

    /// 令牌响应未携带 expires_in 时的默认有效期（秒）
    pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

    /// API端点路径
    pub mod endpoints {
        /// 工作区列表端点
        pub const GROUPS: &str = "/groups";

        /// 单个工作区端点（包含占位符）
        pub const GROUP: &str = "/groups/{workspace_id}";

        /// 报表列表端点
        pub const REPORTS: &str = "/groups/{workspace_id}/reports";

        /// 报表 PBIX 导出端点
        pub const REPORT_EXPORT: &str = "/groups/{workspace_id}/reports/{report_id}/Export";

        /// 数据集列表端点
        pub const DATASETS: &str = "/groups/{workspace_id}/datasets";

        /// 数据集刷新计划端点
        pub const REFRESH_SCHEDULE: &str =
            "/groups/{workspace_id}/datasets/{dataset_id}/refreshSchedule";

        /// 数据流列表端点
        pub const DATAFLOWS: &str = "/groups/{workspace_id}/dataflows";

        /// 仪表板列表端点
        pub const DASHBOARDS: &str = "/groups/{workspace_id}/dashboards";

        /// 应用列表端点（不区分工作区）
        pub const APPS: &str = "/apps";

        /// PBIX 导入端点
        pub const IMPORTS: &str = "/groups/{workspace_id}/imports";

        /// 导入状态查询端点
        pub const IMPORT: &str = "/groups/{workspace_id}/imports/{import_id}";
    }
}

/// 环境变量名称
pub mod env {
    pub const CLIENT_ID: &str = "POWERBI_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "POWERBI_CLIENT_SECRET";
    pub const TENANT_ID: &str = "POWERBI_TENANT_ID";
    pub const API_BASE_URL: &str = "API_BASE_URL";
    pub const BACKUP_PATH: &str = "BACKUP_PATH";
}

/// 备份相关常量
pub mod backup {
    use std::path::{Path, PathBuf};

    /// 备份目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// 备份清单文件前缀
    pub const MANIFEST_PREFIX: &str = "backup_";

    /// 备份清单文件扩展名
    pub const MANIFEST_EXTENSION: &str = ".json";

    /// PBIX 文件子目录
    pub const REPORTS_DIR_NAME: &str = "reports";

    /// PBIX 文件扩展名
    pub const PBIX_EXTENSION: &str = "pbix";

    /// 备份清单格式版本
    pub const FORMAT_VERSION: &str = "2.0";

    /// 工作区名称在备份ID中的最大长度
    pub const MAX_WORKSPACE_NAME_LEN: usize = 30;

    /// 工作区名称清洗后为空时使用的名称
    pub const FALLBACK_WORKSPACE_NAME: &str = "backup";

    /// 获取默认备份存储目录（用于配置）
    pub fn get_default_storage_dir() -> PathBuf {
        Path::new(".").join(BACKUP_DIR_NAME)
    }
}

/// 恢复相关常量
pub mod restore {
    /// 导入状态轮询间隔（秒）
    pub const DEFAULT_IMPORT_POLL_INTERVAL_SECS: u64 = 5;

    /// 导入状态最大轮询次数
    pub const DEFAULT_IMPORT_POLL_MAX_ATTEMPTS: u32 = 60;
}

/// HTTP 服务相关常量
pub mod server {
    /// 默认监听地址
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// 默认监听端口
    pub const DEFAULT_PORT: u16 = 8000;

    /// 默认静态资源目录
    pub const DEFAULT_STATIC_DIR: &str = "./static";
}

/// HTTP 客户端相关常量
pub mod http {
    /// 默认请求超时时间（秒），PBIX 导出可能较慢
    pub const DEFAULT_TIMEOUT: u64 = 300;

    /// User-Agent头
    pub const USER_AGENT: &str = "pbi-backup/0.1";
}

/// 配置文件相关常量
pub mod config {
    /// 按优先级查找的配置文件名
    pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
        ["config.toml", "pbi-backup.toml", ".pbi-backup.toml"];

    /// 默认配置文件名
    pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
}
