//! JWT Token 验证模块
//!
//! Token 由外部认证服务签发，本服务只负责校验。
//! Claims 格式：`{ "payload": "<TokenPayload JSON 字符串>", "exp": <unix 秒> }`

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{config::JwtConfig, domain::OwnerId};

/// 管理员角色
pub const ADMIN_ROLE: &str = "admin";

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 序列化后的 TokenPayload
    pub payload: String,
    pub exp: i64,
}

/// 调用者身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub id: i64,
    #[serde(default)]
    pub iin: String,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "payload", default)]
    pub role: String,
}

impl TokenPayload {
    pub fn owner(&self) -> OwnerId {
        OwnerId(self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// 访问/刷新两套密钥
#[derive(Clone)]
pub struct JwtKeys {
    access_secret: String,
    refresh_secret: String,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .finish()
    }
}

impl JwtKeys {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(config.access_secret.clone(), config.refresh_secret.clone())
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.access_secret.as_bytes(),
            TokenKind::Refresh => self.refresh_secret.as_bytes(),
        }
    }

    /// 验证JWT Token✅只接受 HS256，强制校验过期时间
    pub fn verify_token(&self, token: &str, kind: TokenKind) -> Result<TokenPayload> {
        tracing::debug!("JWT: starting verification, token_len={}", token.len());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret(kind)),
            &validation,
        )
        .map_err(|e| {
            tracing::warn!("JWT: token verification failed: {}", e);
            anyhow!("Token verification failed: {}", e)
        })?;

        let payload: TokenPayload = serde_json::from_str(&token_data.claims.payload)
            .map_err(|e| anyhow!("Invalid payload in token: {}", e))?;

        tracing::debug!(
            "JWT: claims decoded, id={}, role={}",
            payload.id,
            payload.role
        );
        Ok(payload)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<TokenPayload> {
        self.verify_token(token, TokenKind::Access)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenPayload> {
        self.verify_token(token, TokenKind::Refresh)
    }

    /// 签发 Token（本地联调和测试用，生产由认证服务签发）
    pub fn issue_token(
        &self,
        payload: &TokenPayload,
        kind: TokenKind,
        expires_in_secs: i64,
    ) -> Result<String> {
        let claims = Claims {
            payload: serde_json::to_string(payload)?,
            exp: (Utc::now() + Duration::seconds(expires_in_secs)).timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret(kind)),
        )
        .map_err(|e| anyhow!("Failed to encode token: {}", e))
    }
}
