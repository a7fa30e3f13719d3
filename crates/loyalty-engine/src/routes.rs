//! 路由配置模块

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState};

/// 事件接收路由
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", post(handlers::event::submit_event))
}

/// 内部任务管理路由
pub fn internal_job_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/internal-jobs",
            get(handlers::internal_job::list_jobs).post(handlers::internal_job::create_job),
        )
        .route(
            "/internal-jobs/{id}",
            get(handlers::internal_job::get_job)
                .patch(handlers::internal_job::update_job)
                .delete(handlers::internal_job::delete_job),
        )
        .route(
            "/internal-jobs/{id}/preview",
            post(handlers::internal_job::preview_job),
        )
        .route("/internal-jobs/{id}/run", post(handlers::internal_job::run_job))
}

/// 全部 API 路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(event_routes())
        .nest("/admin", internal_job_routes())
        .route("/health", get(handlers::health::health))
}
