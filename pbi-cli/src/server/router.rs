use super::AppState;
use super::handlers;
use axum::Router;
use axum::routing::{delete, get, post};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workspaces", get(handlers::list_workspaces))
        .route("/workspaces/{workspace_id}", get(handlers::get_workspace))
        .route("/backup", post(handlers::create_backup))
        .route("/backup/start/{workspace_id}", post(handlers::start_backup))
        .route("/backups", get(handlers::list_backups))
        .route("/backup/{backup_id}", delete(handlers::delete_backup))
        .route("/backup/{backup_id}/download", get(handlers::download_backup))
        .route("/backup/{backup_id}/pbix-files", get(handlers::pbix_files))
        .route("/backup/{backup_id}/archive", get(handlers::archive_backup))
        .route("/restore/plan", get(handlers::restore_plan))
        .route("/restore/{backup_id}/guide", get(handlers::restore_guide))
        .route(
            "/restore/components/{workspace_id}",
            post(handlers::restore_components),
        )
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/{job_id}", get(handlers::get_job))
        .route("/status", get(handlers::status))
}

/// 组装完整路由：`/api` 下为 JSON 接口，其余路径由静态目录提供
pub fn build_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::CliApp;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use pbi_core::config::AppConfig;
    use pbi_core::testing::{FakeApi, dataset, report, schedule, workspace};
    use serde_json::{Value, json};
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    struct TestServer {
        _dir: TempDir,
        app: CliApp,
        api: Arc<FakeApi>,
        router: Router,
    }

    fn test_server(api: FakeApi) -> TestServer {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.backup.storage_dir = dir.path().join("backups").to_string_lossy().to_string();
        config.restore.import_poll_interval_secs = 0;

        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("index.html"), "<h1>pbi</h1>").unwrap();

        let api = Arc::new(api);
        let app = CliApp::with_api(config, api.clone());
        let router = build_router(Arc::new(AppState::from_app(&app)), &static_dir);
        TestServer {
            _dir: dir,
            app,
            api,
            router,
        }
    }

    fn sales_api() -> FakeApi {
        FakeApi::new()
            .with_workspace(workspace("ws-1", "Sales"))
            .with_report("ws-1", report("r-1", "Revenue"), b"PBIX")
            .with_dataset(
                "ws-1",
                dataset("d-1", "Revenue"),
                Some(schedule(true, &["Monday"], &["07:00"])),
            )
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_list_backups_empty() {
        let server = test_server(FakeApi::new());
        let (status, body) = send(&server.router, Method::GET, "/api/backups", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"count": 0, "backups": []}));
    }

    #[tokio::test]
    async fn test_workspaces_dto() {
        let server = test_server(sales_api());
        let (status, body) = send(&server.router, Method::GET, "/api/workspaces", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["workspaces"][0]["name"], "Sales");
        assert_eq!(body["workspaces"][0]["is_premium_capacity"], false);

        let (status, body) =
            send(&server.router, Method::GET, "/api/workspaces/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_backup_then_inspect() {
        let server = test_server(sales_api());
        let (status, body) = send(
            &server.router,
            Method::POST,
            "/api/backup",
            Some(json!({"workspace_id": "ws-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let job_id = body["job_id"].as_str().unwrap().to_string();
        let backup_id = body["backup_id"].as_str().unwrap().to_string();
        assert!(backup_id.starts_with("sales_"));

        // 等待后台任务结束
        let mut job = Value::Null;
        for _ in 0..200 {
            let (_, value) =
                send(&server.router, Method::GET, &format!("/api/jobs/{job_id}"), None).await;
            job = value;
            if job["status"] == "completed" || job["status"] == "failed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(job["status"], "completed");
        assert_eq!(job["result"]["reports_exported"], 1);

        let (_, jobs) = send(&server.router, Method::GET, "/api/jobs", None).await;
        assert_eq!(jobs["total_jobs"], 1);

        let (status, files) = send(
            &server.router,
            Method::GET,
            &format!("/api/backup/{backup_id}/pbix-files"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(files["pbix_files_count"], 1);
        assert_eq!(files["export_summary"]["successful"], 1);
        assert_eq!(files["metadata"]["workspace_name"], "Sales");

        let (status, plan) = send(
            &server.router,
            Method::GET,
            &format!("/api/restore/plan?backup_id={backup_id}&target_workspace_id=ws-2"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(plan["success"], true);
        assert_eq!(
            plan["restoration_plan"]["restoration_summary"]["automatically_restorable"],
            2
        );

        let response = server
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/backup/{backup_id}/archive"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        let length: usize = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let zip_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(zip_bytes.len(), length);
        assert!(zip_bytes.starts_with(b"PK"));

        let (status, _) = send(
            &server.router,
            Method::DELETE,
            &format!("/api/backup/{backup_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(server.app.storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_components_requires_selection() {
        let server = test_server(sales_api());
        let (status, body) = send(
            &server.router,
            Method::POST,
            "/api/restore/components/ws-2?backup_id=sales_20240115_093000",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(server.api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_components_unknown_backup() {
        let server = test_server(sales_api());
        let (status, body) = send(
            &server.router,
            Method::POST,
            "/api/restore/components/ws-2?backup_id=sales_20240115_093000&restore_refresh_schedules=true",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(server.app.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_ids_are_bad_requests() {
        let server = test_server(FakeApi::new());

        let (status, _) =
            send(&server.router, Method::GET, "/api/backup/not-an-id/download", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&server.router, Method::GET, "/api/jobs/123", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &server.router,
            Method::GET,
            &format!("/api/jobs/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_and_static_index() {
        let server = test_server(FakeApi::new());
        let (status, body) = send(&server.router, Method::GET, "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["backup_path"], server.app.config.backup.storage_dir);

        let response = server
            .router
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<h1>pbi</h1>");
    }

    #[tokio::test]
    async fn test_backup_request_without_workspace_is_rejected() {
        let server = test_server(sales_api());

        let (status, body) =
            send(&server.router, Method::POST, "/api/backup", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("workspace_id"));

        let response = server
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/backup")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);

        assert!(server.api.calls().is_empty());
        assert!(server.app.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_plan_without_target_is_rejected() {
        let server = test_server(sales_api());
        let (status, body) = send(
            &server.router,
            Method::GET,
            "/api/restore/plan?backup_id=sales_20240115_093000",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("target_workspace_id"));
    }

    #[tokio::test]
    async fn test_restore_components_invalid_flag_is_rejected() {
        let server = test_server(sales_api());
        let (status, body) = send(
            &server.router,
            Method::POST,
            "/api/restore/components/ws-2?backup_id=sales_20240115_093000&restore_reports=yes",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("restore_reports"));
        assert!(server.api.calls().is_empty());
        assert!(server.app.jobs.is_empty());
    }
}
