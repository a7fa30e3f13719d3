//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Result, SharedError};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出，并在 `port` 上暴露 `/metrics`
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| SharedError::Observability(format!("安装指标 recorder 失败: {}", e)))?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    describe_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    metrics::describe_counter!(
        "loyalty_events_ingested_total",
        "Events accepted by the ingestion gate, by final status"
    );
    metrics::describe_counter!(
        "loyalty_rule_executions_total",
        "Rule executions by result"
    );
    metrics::describe_counter!(
        "loyalty_cascade_truncated_total",
        "Internal events refused because the cascade depth ceiling was reached"
    );
    metrics::describe_counter!("loyalty_job_runs_total", "Internal job runs by status");
    metrics::describe_counter!(
        "loyalty_job_events_emitted_total",
        "Events emitted by internal jobs, by outcome"
    );
    metrics::describe_gauge!(
        "loyalty_worker_last_run_timestamp",
        "Unix timestamp of the last scheduler tick per worker"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SharedError::Observability(format!("指标端口 {} 绑定失败: {}", addr, e)))?;
    info!("指标服务监听 {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("指标服务异常: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录事件入库后的最终状态
#[inline]
pub fn record_event_ingested(status: &str) {
    metrics::counter!("loyalty_events_ingested_total", "status" => status.to_string()).increment(1);
}

/// 记录单条规则执行结果
#[inline]
pub fn record_rule_execution(result: &str) {
    metrics::counter!("loyalty_rule_executions_total", "result" => result.to_string()).increment(1);
}

/// 级联深度触顶
#[inline]
pub fn record_cascade_truncated() {
    metrics::counter!("loyalty_cascade_truncated_total").increment(1);
}

/// 记录任务执行结果
#[inline]
pub fn record_job_run(status: &str) {
    metrics::counter!("loyalty_job_runs_total", "status" => status.to_string()).increment(1);
}

/// 记录任务发出的事件（created / existing / failed）
#[inline]
pub fn record_job_events(outcome: &str, count: u64) {
    metrics::counter!("loyalty_job_events_emitted_total", "outcome" => outcome.to_string())
        .increment(count);
}

/// 更新 worker 最近一次轮询时间
#[inline]
pub fn set_worker_last_run(worker: &str, unix_seconds: f64) {
    metrics::gauge!("loyalty_worker_last_run_timestamp", "worker" => worker.to_string())
        .set(unix_seconds);
}
