use super::AppState;
use super::dto::{BackupRequest, PbixFileDto, PlanQuery, RestoreComponentsQuery, WorkspaceDto};
use super::error::ApiError;
use crate::project_info::version_info;
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;
use pbi_core::backup::StartedBackup;
use pbi_core::jobs::Job;
use pbi_core::models::BackupRecord;
use pbi_core::restore::{ComponentSelection, RestorationGuide};
use pbi_core::{BackupId, PbiError};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;
use uuid::Uuid;

type HandlerResult<T> = Result<T, ApiError>;

fn parse_backup_id(raw: &str) -> Result<BackupId, PbiError> {
    raw.parse()
}

fn started_response(started: StartedBackup) -> Json<Value> {
    Json(json!({
        "success": true,
        "backup_id": started.backup_id,
        "job_id": started.job_id,
        "timestamp": started.timestamp,
    }))
}

pub async fn list_workspaces(State(state): State<Arc<AppState>>) -> HandlerResult<Json<Value>> {
    let workspaces: Vec<WorkspaceDto> = state
        .api
        .list_workspaces()
        .await?
        .into_iter()
        .map(WorkspaceDto::from)
        .collect();

    Ok(Json(json!({
        "count": workspaces.len(),
        "workspaces": workspaces,
    })))
}

pub async fn get_workspace(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> HandlerResult<Json<WorkspaceDto>> {
    let workspace = state.api.get_workspace(&workspace_id).await?;
    Ok(Json(workspace.into()))
}

pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    request: Result<Json<BackupRequest>, JsonRejection>,
) -> HandlerResult<Json<Value>> {
    let Json(request) = request?;
    let started = state.backup_service.start_backup(&request.workspace_id).await?;
    Ok(started_response(started))
}

pub async fn start_backup(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> HandlerResult<Json<Value>> {
    let started = state.backup_service.start_backup(&workspace_id).await?;
    Ok(started_response(started))
}

pub async fn list_backups(State(state): State<Arc<AppState>>) -> HandlerResult<Json<Value>> {
    let backups = state.storage.list().await?;
    Ok(Json(json!({
        "count": backups.len(),
        "backups": backups,
    })))
}

pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> HandlerResult<Json<Value>> {
    let id = parse_backup_id(&backup_id)?;
    state.storage.delete(&id).await?;
    Ok(Json(json!({
        "success": true,
        "backup_id": id,
    })))
}

pub async fn download_backup(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> HandlerResult<Json<BackupRecord>> {
    let id = parse_backup_id(&backup_id)?;
    Ok(Json(state.storage.load(&id).await?))
}

pub async fn pbix_files(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> HandlerResult<Json<Value>> {
    let id = parse_backup_id(&backup_id)?;
    let record = state.storage.load(&id).await?;

    let files: Vec<PbixFileDto> = record
        .reports
        .iter()
        .filter(|r| r.export_status.is_success())
        .filter_map(|r| {
            r.pbix_file.as_ref().map(|path| PbixFileDto {
                report_id: r.report.id.clone(),
                report_name: r.report.name.clone(),
                pbix_file: path.clone(),
                file_size_bytes: r.file_size_bytes,
            })
        })
        .collect();

    Ok(Json(json!({
        "backup_id": record.backup_id,
        "pbix_files_count": files.len(),
        "pbix_files": files,
        "export_summary": record.export_summary(),
        "metadata": {
            "workspace_id": record.workspace_id,
            "workspace_name": record.workspace_name(),
            "timestamp": record.timestamp,
            "version": record.version,
        },
    })))
}

pub async fn archive_backup(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    let id = parse_backup_id(&backup_id)?;
    let path = state.storage.archive(&id).await?;
    let file = tokio::fs::File::open(&path).await.map_err(PbiError::from)?;
    let size = file.metadata().await.map_err(PbiError::from)?.len();

    // 按块读取压缩包，不在内存中缓存整个文件
    let body = Body::from_stream(ReaderStream::new(file));
    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (header::CONTENT_LENGTH, size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{id}.zip\""),
        ),
    ];
    Ok((headers, body))
}

pub async fn restore_plan(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PlanQuery>, QueryRejection>,
) -> HandlerResult<Json<Value>> {
    let Query(query) = query?;
    let id = parse_backup_id(&query.backup_id)?;
    let plan = state
        .restore_service
        .plan(&id, &query.target_workspace_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "restoration_plan": plan,
    })))
}

pub async fn restore_guide(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> HandlerResult<Json<RestorationGuide>> {
    let id = parse_backup_id(&backup_id)?;
    Ok(Json(state.restore_service.guide(&id).await?))
}

pub async fn restore_components(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    query: Result<Query<RestoreComponentsQuery>, QueryRejection>,
) -> HandlerResult<Json<Value>> {
    let Query(query) = query?;
    let selection = ComponentSelection {
        reports: query.restore_reports,
        datasets: query.restore_datasets,
        refresh_schedules: query.restore_refresh_schedules,
        dashboards: query.restore_dashboards,
        dataflows: query.restore_dataflows,
        apps: query.restore_apps,
    };
    if selection.is_empty() {
        return Err(PbiError::validation("至少需要选择一个要恢复的组件").into());
    }

    let raw_id = query
        .backup_id
        .ok_or_else(|| PbiError::validation("缺少参数 backup_id"))?;
    let id = parse_backup_id(&raw_id)?;

    let job_id = state
        .restore_service
        .start_restore(&id, &workspace_id, selection)
        .await?;
    info!("恢复任务已受理: {}", job_id);

    Ok(Json(json!({
        "success": true,
        "job_id": job_id,
        "selected_components": selection.selected(),
    })))
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "total_jobs": state.jobs.len(),
        "jobs": state.jobs.list(),
    }))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> HandlerResult<Json<Job>> {
    let id: Uuid = job_id
        .parse()
        .map_err(|_| PbiError::validation(format!("无效的任务ID: {job_id}")))?;
    state
        .jobs
        .get(&id)
        .map(Json)
        .ok_or_else(|| PbiError::not_found(format!("任务 {id}")).into())
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "timestamp": Utc::now(),
        "backup_path": state.backup_path,
        "version": version_info::CLI_VERSION,
    }))
}
