use crate::project_info::{metadata, version_info};
use clap::{Args, Parser, Subcommand};
use pbi_core::restore::ComponentSelection;
use std::path::PathBuf;

/// Power BI Backup - 工作区备份与恢复工具
#[derive(Parser)]
#[command(name = "pbi-backup")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// 要恢复的组件
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ComponentArgs {
    /// 导入备份中的 PBIX 报表
    #[arg(long)]
    pub reports: bool,
    /// 检查数据集（数据集随 PBIX 导入创建）
    #[arg(long)]
    pub datasets: bool,
    /// 恢复数据集刷新计划
    #[arg(long)]
    pub refresh_schedules: bool,
    /// 列出需要手动重建的仪表板
    #[arg(long)]
    pub dashboards: bool,
    /// 列出需要手动重建的数据流
    #[arg(long)]
    pub dataflows: bool,
    /// 列出需要手动重新发布的应用
    #[arg(long)]
    pub apps: bool,
    /// 选择全部组件
    #[arg(long)]
    pub all: bool,
}

impl From<ComponentArgs> for ComponentSelection {
    fn from(args: ComponentArgs) -> Self {
        if args.all {
            return ComponentSelection::all();
        }
        ComponentSelection {
            reports: args.reports,
            datasets: args.datasets,
            refresh_schedules: args.refresh_schedules,
            dashboards: args.dashboards,
            dataflows: args.dataflows,
            apps: args.apps,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 创建带注释的默认配置文件
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 启动 HTTP 服务和 Web 界面
    Serve {
        /// 监听地址（默认使用配置文件中的值）
        #[arg(long)]
        host: Option<String>,
        /// 监听端口（默认使用配置文件中的值）
        #[arg(long)]
        port: Option<u16>,
    },
    /// 列出服务主体可访问的工作区
    Workspaces,
    /// 立即备份指定工作区
    Backup {
        /// 工作区 ID
        workspace_id: String,
    },
    /// 列出所有备份
    ListBackups,
    /// 删除备份
    DeleteBackup {
        /// 备份 ID
        backup_id: String,
    },
    /// 显示恢复计划（不修改目标工作区）
    Plan {
        /// 备份 ID
        backup_id: String,
        /// 目标工作区 ID
        target_workspace_id: String,
    },
    /// 将备份恢复到目标工作区
    Restore {
        /// 备份 ID
        backup_id: String,
        /// 目标工作区 ID
        target_workspace_id: String,
        #[command(flatten)]
        components: ComponentArgs,
    },
}
