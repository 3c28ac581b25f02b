//! 数据库目录聚合服务
//!
//! 提供多服务器数据库目录功能，包括：
//! - 并发探测所选服务器并列出数据库
//! - 分批读取各数据库的版本标记
//! - 目录结果缓存与强制失效

mod attempts;
mod batcher;
mod cache;
mod handlers;
mod probe;
mod registry;
mod routes;
mod service;
mod settings;
mod state;
mod vault;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use settings::CatalogSettings;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "catalog-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "目录服务 API",
        version = "0.1.0",
        description = "数据库目录聚合微服务"
    ),
    paths(
        handlers::list_databases,
        handlers::refresh_cache,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ServerIdsRequest,
        common::models::CatalogListing,
        common::models::ProbeOutcome,
        common::models::DatabaseDescriptor,
        common::models::AggregationSummary,
        common::models::CacheRefreshResult,
        common::models::ServerType,
        handlers::HealthResponse,
    )),
    tags(
        (name = "catalog", description = "数据库目录端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（含 .env）
    let config = AppConfig::load_with_service(SERVICE_NAME).context("invalid service configuration")?;

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = CatalogSettings::from_env().context("invalid catalog settings")?;
    info!(
        server_timeout_secs = settings.server_timeout.as_secs(),
        version_batch_size = settings.version_batch_size,
        cache_ttl_secs = settings.cache_ttl.as_secs(),
        "Catalog settings loaded"
    );

    // 创建应用状态（连接元数据 MySQL 库与缓存）
    let state = AppState::new(config.clone(), settings)
        .await
        .context("failed to initialize application state (check DATABASE_URL and REDIS_URL)")?;
    info!(cache = state.cache_backend, "Catalog cache ready");

    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
