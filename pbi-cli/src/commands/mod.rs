pub mod backup;
pub mod restore;
pub mod serve;
pub mod workspaces;

pub use backup::{run_backup, run_delete_backup, run_list_backups};
pub use restore::{run_plan, run_restore};
pub use serve::run_serve;
pub use workspaces::run_workspaces;
