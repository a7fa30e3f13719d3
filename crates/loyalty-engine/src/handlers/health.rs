//! 健康检查

use axum::{Json, extract::State, http::StatusCode};
use loyalty_shared::database::ping;
use tracing::warn;

use crate::{dto::HealthResponse, state::AppState};

/// 存活与数据库连通性
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match ping(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                service: "loyalty-engine",
                database: "ok",
            }),
        ),
        Err(e) => {
            warn!(error = %e, code = e.code(), retryable = e.is_retryable(), "数据库健康检查失败");
            // 连接类错误可能自行恢复，其余视为故障
            let database = if e.is_retryable() { "unavailable" } else { "error" };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    service: "loyalty-engine",
                    database,
                }),
            )
        }
    }
}
