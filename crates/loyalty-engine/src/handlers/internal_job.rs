//! 内部任务管理 API
//!
//! 所有接口都限定在 X-Brand 请求头指定的品牌内

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        ApiResponse, CreateInternalJobRequest, DeletedResponse, JobPreviewResponse, JobRunResponse,
        ListJobsQuery, PreviewQuery, UpdateInternalJobRequest,
    },
    error::EngineError,
    handlers::Brand,
    models::InternalJob,
    state::AppState,
};

/// 获取任务列表
///
/// GET /admin/internal-jobs?active=true
pub async fn list_jobs(
    State(state): State<AppState>,
    Brand(brand): Brand,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ApiResponse<Vec<InternalJob>>>, EngineError> {
    let jobs = state.jobs.list_jobs(&brand, &query).await?;
    Ok(Json(ApiResponse::success(jobs)))
}

/// 创建任务
///
/// POST /admin/internal-jobs
pub async fn create_job(
    State(state): State<AppState>,
    Brand(brand): Brand,
    Json(req): Json<CreateInternalJobRequest>,
) -> Result<Json<ApiResponse<InternalJob>>, EngineError> {
    req.validate()?;
    let job = state.jobs.create_job(&brand, req, Utc::now()).await?;
    Ok(Json(ApiResponse::success_with_message(job, "任务创建成功")))
}

/// 获取任务详情
///
/// GET /admin/internal-jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Brand(brand): Brand,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InternalJob>>, EngineError> {
    let job = state.jobs.get_job(&brand, id).await?;
    Ok(Json(ApiResponse::success(job)))
}

/// 更新任务
///
/// PATCH /admin/internal-jobs/{id}
pub async fn update_job(
    State(state): State<AppState>,
    Brand(brand): Brand,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateInternalJobRequest>,
) -> Result<Json<ApiResponse<InternalJob>>, EngineError> {
    req.validate()?;
    let job = state.jobs.update_job(&brand, id, req, Utc::now()).await?;
    Ok(Json(ApiResponse::success_with_message(job, "任务更新成功")))
}

/// 删除任务
///
/// DELETE /admin/internal-jobs/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Brand(brand): Brand,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DeletedResponse>>, EngineError> {
    let deleted = state.jobs.delete_job(&brand, id).await?;
    Ok(Json(ApiResponse::success(DeletedResponse { deleted })))
}

/// 预览任务目标客户
///
/// POST /admin/internal-jobs/{id}/preview?limit=50&offset=0
pub async fn preview_job(
    State(state): State<AppState>,
    Brand(brand): Brand,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<ApiResponse<JobPreviewResponse>>, EngineError> {
    let preview = state.jobs.preview_job(&brand, id, &query, Utc::now()).await?;
    Ok(Json(ApiResponse::success(preview)))
}

/// 立即运行任务
///
/// POST /admin/internal-jobs/{id}/run
pub async fn run_job(
    State(state): State<AppState>,
    Brand(brand): Brand,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobRunResponse>>, EngineError> {
    let summary = state.jobs.run_job_now(&brand, id, Utc::now()).await?;
    Ok(Json(ApiResponse::success(summary)))
}
