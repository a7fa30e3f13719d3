//! 积分引擎服务
//!
//! 启动顺序：配置 → 可观测性 → 数据库连接池 → 迁移 → HTTP 服务与调度 Worker。
//! 收到 Ctrl+C 或 SIGTERM 后翻转关闭信号，Worker 在两轮之间退出，HTTP 服务等待已有请求处理完毕。

use axum::{Router, http::HeaderValue, middleware};
use loyalty_engine::{routes, state::AppState, worker::JobWorker};
use loyalty_shared::{
    config::AppConfig,
    database::Database,
    observability::{self, middleware as obs_middleware},
};
use tokio::{net::TcpListener, sync::watch};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("loyalty-engine")?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting loyalty-engine on {}", config.server_addr());

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;

    let state = AppState::build(db.pool().clone()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let worker_handle = if config.scheduler.enabled {
        let worker = JobWorker::new(
            state.job_repo.clone(),
            state.runner.clone(),
            config.scheduler.clone(),
        );
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { worker.run(rx).await }))
    } else {
        info!("调度 Worker 未启用");
        None
    };

    let app = Router::new()
        .merge(routes::api_routes())
        .layer(cors_layer())
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "调度 Worker 异常退出");
        }
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// CORS 配置：LOYALTY_CORS_ORIGINS 为逗号分隔的来源列表，未设置或为 "*" 时允许任意来源
fn cors_layer() -> CorsLayer {
    let origins = std::env::var("LOYALTY_CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
    if origins.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    info!("CORS allowed_origins: {}", origins);
    let origins: Vec<_> = origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
