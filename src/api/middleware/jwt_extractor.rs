//! JWT 自动提取中间件
//! 从 Bearer Token 中解析调用者身份并注入 request extensions

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use super::trace_id::TraceId;
use crate::{app_state::AppState, domain::OwnerId, error::AppError};

/// JWT 认证上下文
#[derive(Debug, Clone)]
pub struct JwtAuthContext {
    pub owner: OwnerId,
    pub username: String,
    pub role: String,
}

/// 提取 `Authorization: Bearer <token>` 中的 token
fn bearer_token(req: &Request) -> Result<&str, &'static str> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or("Authorization header not found")?
        .to_str()
        .map_err(|_| "Invalid authorization header")?;

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err("Invalid authorization header"),
    }
}

/// JWT 自动提取中间件
/// 只接受访问令牌（access secret）
pub async fn jwt_extractor_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .cloned()
        .unwrap_or_else(TraceId::generate);
    let path = req.uri().path().to_string();

    let token = bearer_token(&req).map_err(|reason| {
        tracing::warn!("JWT middleware: {} for {}", reason, path);
        AppError::unauthorized(reason).with_trace_id(trace_id.0.clone())
    })?;

    let payload = state.jwt.verify_access_token(token).map_err(|e| {
        tracing::warn!("JWT middleware: verification failed for {}: {}", path, e);
        AppError::unauthorized("Unauthorized to perform this action")
            .with_trace_id(trace_id.0.clone())
    })?;

    let auth_context = JwtAuthContext {
        owner: payload.owner(),
        username: payload.username,
        role: payload.role,
    };

    tracing::debug!(
        owner = %auth_context.owner,
        role = %auth_context.role,
        "JWT middleware: authenticated request to {}",
        path
    );

    req.extensions_mut().insert(auth_context);
    Ok(next.run(req).await)
}

/// Axum Extractor: 从 request extensions 中提取 JWT 认证上下文
#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for JwtAuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<JwtAuthContext>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Not authenticated"))
    }
}
