use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    api::{
        handlers::{create_wallet, get_wallets, healthz, list_all_wallets, replenish, transfer},
        middleware::{jwt_extractor_middleware, trace_id_middleware},
    },
    app_state::AppState,
};

pub mod handlers;
pub mod middleware;
pub mod response; // 统一响应格式

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::healthz,
        handlers::create_wallet,
        handlers::get_wallets,
        handlers::list_all_wallets,
        handlers::replenish,
        handlers::transfer,
    ),
    components(schemas(
        handlers::ReplenishReq,
        handlers::TransferReq,
        handlers::WalletResp,
        handlers::TransferResp,
        handlers::WalletWithHistoryResp,
        handlers::Healthz,
        crate::error_body::ErrorBodyDoc,
    )),
    modifiers(&BearerAuth),
    tags((name = "walletledger", description = "Wallet ledger API"))
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// 根据配置构造 CORS 层；未配置 ORIGIN 时允许任意来源
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => base.allow_origin(value),
        Some(Err(e)) => {
            tracing::warn!("Invalid ORIGIN header value, allowing any origin: {}", e);
            base.allow_origin(Any)
        }
        None => base.allow_origin(Any),
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    // 公开路由：健康检查、指标、文档
    let public_routes = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/metrics",
            get(|| async { crate::metrics::render_prometheus().into_response() }),
        )
        .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));

    // 受保护路由：需要 Bearer 访问令牌；/list_wallets 在 handler 内再校验 admin 角色
    let protected_routes = Router::new()
        .route("/wallet", post(create_wallet))
        .route("/wallets", get(get_wallets))
        .route("/replenish", post(replenish))
        .route("/transfer", post(transfer))
        .route("/list_wallets", get(list_all_wallets))
        .layer(from_fn_with_state(state.clone(), jwt_extractor_middleware));

    public_routes
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(trace_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(state.config.server.cors_origin.as_deref())),
        )
        .with_state(state)
}
