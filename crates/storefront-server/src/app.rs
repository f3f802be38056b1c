use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use storefront_core::{AppConfig, TtlCache};
use storefront_search::QueryEmbedder;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{request_id, rewrite_sse_accept};
use crate::tools;

pub const SERVICE_NAME: &str = "storefront-mcp-core";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub embedder: Arc<QueryEmbedder>,
    pub search_cache: Arc<TtlCache<Value>>,
    pub embed_cache: Arc<TtlCache<Vec<f32>>>,
    pub v2_enabled: bool,
    pub shadow_sample_rate: f64,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, config: &AppConfig) -> Self {
        Self {
            pool,
            embedder: Arc::new(QueryEmbedder::new(
                config.openai_api_key.clone(),
                config.embed_model.clone(),
            )),
            search_cache: Arc::new(TtlCache::new(
                config.search_cache_size,
                Duration::from_secs(config.search_cache_ttl_secs),
            )),
            embed_cache: Arc::new(TtlCache::new(
                config.embed_cache_size,
                Duration::from_secs(config.embed_cache_ttl_secs),
            )),
            v2_enabled: config.v2_enabled,
            shadow_sample_rate: config.shadow_sample_rate,
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-request-id"),
        ])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(descriptor))
        .route("/mcp", get(descriptor))
        .route("/mcp/", get(descriptor))
        .route("/mcp/sse", get(descriptor))
        .route("/sse", get(sse_alias))
        .route("/health", get(health))
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_protected_resource),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp/sse",
            get(oauth_protected_resource),
        )
        .route(
            "/.well-known/oauth-protected-resource/sse",
            get(oauth_protected_resource),
        )
        .route("/.well-known/oauth-authorization-server", get(oauth_disabled))
        .route("/.well-known/openid-configuration", get(oauth_disabled))
        .route("/mcp/tool/{tool}", post(tools::invoke_tool))
        .route("/mcp/{slug}/tool/{tool}", post(tools::invoke_tool_scoped))
        .route("/mcp-legacy/tool/{tool}", post(tools::invoke_tool))
        .route(
            "/mcp-legacy/{slug}/tool/{tool}",
            post(tools::invoke_tool_scoped),
        )
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id))
                .layer(axum::middleware::from_fn(rewrite_sse_accept)),
        )
        .with_state(state)
}

fn base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

fn mcp_descriptor(headers: &HeaderMap) -> Value {
    let base = base_url(headers);
    json!({
        "ok": true,
        "service": SERVICE_NAME,
        "transport": "sse",
        "sse_url": format!("{base}/mcp/sse"),
        "messages_url": format!("{base}/mcp/messages/"),
        "legacy_sse_url": format!("{base}/mcp-legacy/sse"),
    })
}

async fn descriptor(headers: HeaderMap) -> impl IntoResponse {
    Json(mcp_descriptor(&headers))
}

async fn sse_alias() -> impl IntoResponse {
    // Keep root-level probe path valid while steering clients to /mcp/sse.
    Json(json!({
        "resource": "/mcp/sse",
        "hint": "Use /mcp/sse for SSE transport",
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (db_ready, db_error) = match storefront_db::ping(&state.pool).await {
        Ok(()) => (true, String::new()),
        Err(error) => {
            tracing::warn!(error = %error, "health check: database unavailable");
            (false, error.to_string())
        }
    };

    Json(json!({
        "ok": true,
        "service": SERVICE_NAME,
        "db_ready": db_ready,
        "embedder_enabled": state.embedder.enabled(),
        "mcp_v2_enabled": state.v2_enabled,
        "db_error": db_error,
    }))
}

async fn oauth_protected_resource(headers: HeaderMap) -> impl IntoResponse {
    // No OAuth required; advertise the MCP resource directly.
    Json(json!({
        "resource": format!("{}/mcp/sse", base_url(&headers)),
        "authorization_servers": [],
    }))
}

async fn oauth_disabled() -> impl IntoResponse {
    Json(json!({ "oauth_supported": false }))
}

#[cfg(test)]
pub(crate) fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        bind_addr: "127.0.0.1:0".parse().expect("test bind addr"),
        log_level: "info".to_string(),
        openai_api_key: None,
        embed_model: "text-embedding-3-small".to_string(),
        v2_enabled: true,
        shadow_sample_rate: 0.0,
        search_cache_size: 16,
        search_cache_ttl_secs: 45,
        embed_cache_size: 16,
        embed_cache_ttl_secs: 900,
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 10,
        db_statement_timeout_secs: 30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app(pool: PgPool) -> Router {
        build_app(AppState::new(pool, &test_config("postgres://unused")))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json parse")
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn descriptor_reports_service_and_sse_url(pool: PgPool) {
        for path in ["/", "/mcp", "/mcp/", "/mcp/sse"] {
            let response = test_app(pool.clone())
                .oneshot(
                    Request::builder()
                        .uri(path)
                        .header("host", "mcp.example:8000")
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("response");

            assert_eq!(response.status(), StatusCode::OK, "path {path}");
            let json = body_json(response).await;
            assert_eq!(json["ok"], json!(true));
            assert_eq!(json["service"], json!(SERVICE_NAME));
            assert_eq!(json["sse_url"], json!("http://mcp.example:8000/mcp/sse"));
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_reports_db_and_embedder_state(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], json!(true));
        assert_eq!(json["db_ready"], json!(true));
        assert_eq!(json["embedder_enabled"], json!(false));
        assert_eq!(json["mcp_v2_enabled"], json!(true));
        assert_eq!(json["db_error"], json!(""));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn oauth_stubs_advertise_no_authorization(pool: PgPool) {
        let response = test_app(pool.clone())
            .oneshot(
                Request::builder()
                    .uri("/.well-known/oauth-protected-resource")
                    .header("host", "mcp.example")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let json = body_json(response).await;
        assert_eq!(json["resource"], json!("http://mcp.example/mcp/sse"));
        assert_eq!(json["authorization_servers"], json!([]));

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/.well-known/oauth-authorization-server")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let json = body_json(response).await;
        assert_eq!(json["oauth_supported"], json!(false));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_tool_returns_404(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp/tool/no_such_tool")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn non_object_arguments_return_400(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp/tool/list_stores")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"arguments": [1, 2, 3]}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unexpected_argument_shape_returns_400(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp/tool/list_stores")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"limit": "soon"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
