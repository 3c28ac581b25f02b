//! 目录服务路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{health_check, list_databases, refresh_cache};
use crate::state::AppState;

/// 创建目录服务路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/catalog/databases", post(list_databases))
        .route("/api/catalog/refresh", post(refresh_cache))
        .route("/api/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        middleware,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use common::config::AppConfig;
    use common::errors::{AppError, AppResult};
    use common::middleware::request_id::request_id_middleware;
    use common::models::{
        CacheRefreshResult, CatalogListing, DatabaseDescriptor, ProbeOutcome, Server, ServerType,
    };

    use crate::service::CatalogServiceTrait;

    struct StubCatalog;

    #[async_trait]
    impl CatalogServiceTrait for StubCatalog {
        async fn list_databases(&self, server_ids: &[String]) -> AppResult<CatalogListing> {
            if server_ids.iter().any(|id| id == "ghost") {
                return Err(AppError::NoActiveServers("ghost".into()));
            }
            let server = Server {
                id: server_ids[0].clone(),
                name: "primary".into(),
                host: "db1.internal".into(),
                port: 5432,
                username: "catalog".into(),
                encrypted_password: String::new(),
                server_type: ServerType::Postgresql,
                is_active: true,
            };
            Ok(CatalogListing::new(vec![
                ProbeOutcome::success(
                    &server,
                    vec![DatabaseDescriptor::new("app", "8 kB", "postgres", None)],
                ),
                ProbeOutcome::missing("srv-x"),
            ]))
        }

        async fn force_cache_update(&self, server_ids: &[String]) -> AppResult<CacheRefreshResult> {
            Ok(CacheRefreshResult {
                success: true,
                message: format!("Cache cleared for {} server(s)", server_ids.len()),
            })
        }
    }

    fn app() -> Router {
        let config = AppConfig {
            service_name: "catalog-service".into(),
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            redis_url: None,
            connect_timeout_secs: 1,
            max_connections: 1,
        };
        let state = AppState {
            config,
            catalog: Arc::new(StubCatalog),
            cache_backend: "memory",
            supported_types: vec![ServerType::Postgresql],
        };
        router()
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-request-id", "req-42")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_databases_envelope() {
        let response = app()
            .oneshot(post_json(
                "/api/catalog/databases",
                r#"{"serverIds":["srv-1","srv-x"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-42");
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["meta"]["request_id"], "req-42");
        assert_eq!(body["data"]["summary"]["totalServers"], 2);
        assert_eq!(body["data"]["summary"]["successfulServers"], 1);
        assert_eq!(body["data"]["results"][0]["fromCache"], false);
        assert_eq!(
            body["data"]["results"][1]["error"],
            "server not found or inactive"
        );
    }

    #[tokio::test]
    async fn test_empty_server_ids_rejected() {
        let response = app()
            .oneshot(post_json("/api/catalog/databases", r#"{"serverIds":[]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_no_active_servers_is_not_found() {
        let response = app()
            .oneshot(post_json("/api/catalog/databases", r#"{"serverIds":["ghost"]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_refresh_cache() {
        let response = app()
            .oneshot(post_json("/api/catalog/refresh", r#"{"serverIds":["a","b"]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["success"], true);
        assert_eq!(body["data"]["message"], "Cache cleared for 2 server(s)");
    }

    #[tokio::test]
    async fn test_health_reports_cache_backend() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["cacheBackend"], "memory");
        assert_eq!(body["supportedTypes"][0], "postgresql");
    }
}
