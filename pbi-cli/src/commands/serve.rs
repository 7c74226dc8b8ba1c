use crate::app::CliApp;
use crate::server::{AppState, build_router};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// 启动 HTTP 服务
pub async fn run_serve(app: &CliApp, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| app.config.server.host.clone());
    let port = port.unwrap_or(app.config.server.port);
    let addr = format!("{host}:{port}");

    let state = Arc::new(AppState::from_app(app));
    let router = build_router(state, Path::new(&app.config.server.static_dir));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;
    info!("🚀 服务已启动: http://{}", addr);
    info!("📁 备份目录: {}", app.storage.root().display());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP 服务异常退出")?;

    info!("👋 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
}
