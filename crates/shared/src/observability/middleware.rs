//! HTTP 中间件
//!
//! 为每个请求建立追踪 span 并记录请求指标。指标的 path 标签取路由模板
//! （如 `/admin/internal-jobs/{id}`），未命中路由的请求统一记为 `unmatched`。

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info_span, warn};

use super::metrics;

/// HTTP 请求追踪和指标中间件
///
/// ```ignore
/// use axum::{Router, middleware};
/// use loyalty_shared::observability::middleware::http_tracing;
///
/// let app = Router::new()
///     .route("/health", get(health))
///     .layer(middleware::from_fn(http_tracing));
/// ```
pub async fn http_tracing(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let uri = request.uri().path().to_string();
    let route = route_label(request.extensions().get::<MatchedPath>());
    let brand = request
        .headers()
        .get("x-brand")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let span = info_span!(
        "http_request",
        method = %method,
        uri = %uri,
        brand = %brand,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as i64);
    if response.status().is_server_error() {
        warn!(parent: &span, method = %method, uri = %uri, status, "请求处理失败");
    }

    metrics::record_http_request(&method, &route, status, latency.as_secs_f64());

    response
}

fn route_label(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}
