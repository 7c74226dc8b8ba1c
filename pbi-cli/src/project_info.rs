/// 项目信息模块
///
/// pbi-backup 是面向用户的主程序，项目元数据统一在这里定义，
/// pbi-core 作为内部库只提供技术性常量

/// 项目元数据（自动从 Cargo.toml 同步）
pub mod metadata {
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称
    pub mod display {
        pub const FRIENDLY_NAME: &str = "Power BI Backup";

        /// 项目详细描述
        pub const DESCRIPTION_LONG: &str = "备份 Power BI 工作区中的报表（PBIX）、数据集、刷新计划、仪表板、数据流和应用，并将其恢复到任意工作区";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本（自动从 Cargo.toml 同步）
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// 备份清单格式版本
    pub const BACKUP_FORMAT_VERSION: &str = pbi_core::constants::backup::FORMAT_VERSION;
}

/// 获取版本信息字符串
pub fn get_version_string() -> String {
    format!(
        "{} v{} (备份格式 {})",
        metadata::display::FRIENDLY_NAME,
        version_info::CLI_VERSION,
        version_info::BACKUP_FORMAT_VERSION
    )
}
