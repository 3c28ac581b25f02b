//! Handler模块

use std::time::Instant;

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::middleware::request_id::RequestId;
use common::models::{CacheRefreshResult, CatalogListing, ServerIdsRequest, ServerType};
use common::response::ApiResponse;

use crate::state::AppState;
use crate::SERVICE_NAME;

/// 列出所选服务器上的所有数据库
///
/// 单个服务器失败不会导致整个请求失败，失败信息体现在对应的结果项中。
#[utoipa::path(
    post,
    path = "/api/catalog/databases",
    tag = "catalog",
    request_body = ServerIdsRequest,
    responses(
        (status = 200, description = "各服务器的数据库列表及汇总", body = ApiResponse<CatalogListing>),
        (status = 400, description = "请求参数错误"),
        (status = 404, description = "没有找到活跃的服务器")
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<ServerIdsRequest>,
) -> Result<Json<ApiResponse<CatalogListing>>, AppError> {
    req.validate()?;
    let started = Instant::now();

    let data = state.catalog.list_databases(&req.server_ids).await?;

    Ok(Json(
        ApiResponse::ok_with_service(data, SERVICE_NAME)
            .with_request_id(request_id.as_str())
            .with_duration(started.elapsed().as_millis() as u64),
    ))
}

/// 强制清除所选服务器的目录缓存
///
/// 仅删除缓存条目，下次查询时重新探测。
#[utoipa::path(
    post,
    path = "/api/catalog/refresh",
    tag = "catalog",
    request_body = ServerIdsRequest,
    responses(
        (status = 200, description = "缓存已清除", body = ApiResponse<CacheRefreshResult>),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn refresh_cache(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<ServerIdsRequest>,
) -> Result<Json<ApiResponse<CacheRefreshResult>>, AppError> {
    req.validate()?;
    let data = state.catalog.force_cache_update(&req.server_ids).await?;
    Ok(Json(
        ApiResponse::ok_with_service(data, SERVICE_NAME).with_request_id(request_id.as_str()),
    ))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        cache_backend: state.cache_backend.to_string(),
        supported_types: state.supported_types.clone(),
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 目录缓存后端（redis 或 memory）
    pub cache_backend: String,
    /// 可探测的服务器类型
    pub supported_types: Vec<ServerType>,
}
