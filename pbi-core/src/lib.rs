pub mod api;
pub mod api_config;
pub mod authenticated_client;
pub mod backup;
pub mod backup_id;
pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod models;
pub mod restore;
pub mod storage;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use api::{ApiClient, PowerBiApi};
pub use backup_id::BackupId;
pub use error::{PbiError, Result};
