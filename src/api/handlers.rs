use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::{
        middleware::{require_admin, JwtAuthContext, TraceId},
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    domain::{
        is_valid_wallet_code, TransferRecord, Wallet, WalletAddressing, WalletRef,
        WalletWithHistory,
    },
    error::AppError,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

// -------- 请求体 --------

/// 请求体中的钱包标识：数字或字符串，按配置的寻址方式解释
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WalletKey {
    Number(i64),
    Text(String),
}

impl WalletKey {
    /// 在 API 边界一次性解析为 `WalletRef`
    pub fn resolve(&self, addressing: WalletAddressing) -> Result<WalletRef, AppError> {
        match (addressing, self) {
            (WalletAddressing::Id, WalletKey::Number(id)) => Ok(WalletRef::Id(*id)),
            (WalletAddressing::Id, WalletKey::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(WalletRef::Id)
                .map_err(|_| AppError::bad_request(format!("invalid wallet id: {}", s))),
            (WalletAddressing::Code, WalletKey::Text(code)) if is_valid_wallet_code(code) => {
                Ok(WalletRef::Code(code.clone()))
            }
            (WalletAddressing::Code, WalletKey::Text(code)) => Err(AppError::bad_request(
                format!("wallet code must be a 12-digit string, got {}", code),
            )),
            // 数字形式会丢失编码的前导零
            (WalletAddressing::Code, WalletKey::Number(_)) => Err(AppError::bad_request(
                "wallet code must be a 12-digit string",
            )),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplenishReq {
    /// 钱包 id（数字）或 12 位编码（字符串），取决于服务配置
    #[schema(value_type = String, example = "1")]
    pub wallet_id: WalletKey,
    /// 充值金额（最小货币单位，必须为正）
    pub amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferReq {
    #[schema(value_type = String, example = "1")]
    pub from_wallet_id: WalletKey,
    #[schema(value_type = String, example = "2")]
    pub to_wallet_id: WalletKey,
    pub amount: i64,
}

// -------- 响应体 --------

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletResp {
    pub id: i64,
    pub owner: i64,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub balance: i64,
}

impl From<Wallet> for WalletResp {
    fn from(w: Wallet) -> Self {
        Self {
            id: w.id,
            owner: w.owner.0,
            code: w.code,
            created_at: w.created_at,
            balance: w.balance,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferResp {
    pub id: i64,
    pub amount: i64,
    pub from_wallet_id: i64,
    pub from_wallet_code: String,
    pub to_wallet_id: i64,
    pub to_wallet_code: String,
    pub created_at: DateTime<Utc>,
}

impl From<TransferRecord> for TransferResp {
    fn from(t: TransferRecord) -> Self {
        Self {
            id: t.id,
            amount: t.amount,
            from_wallet_id: t.from_wallet_id,
            from_wallet_code: t.from_wallet_code,
            to_wallet_id: t.to_wallet_id,
            to_wallet_code: t.to_wallet_code,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletWithHistoryResp {
    pub id: i64,
    pub owner: i64,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub balance: i64,
    /// 该钱包作为转出方的全部转账（按时间正序）
    pub transfers: Vec<TransferResp>,
    /// 为 true 时 transfers 因查询失败被降级为空
    pub history_degraded: bool,
}

impl From<WalletWithHistory> for WalletWithHistoryResp {
    fn from(entry: WalletWithHistory) -> Self {
        let w = entry.wallet;
        Self {
            id: w.id,
            owner: w.owner.0,
            code: w.code,
            created_at: w.created_at,
            balance: w.balance,
            transfers: entry.transfers.into_iter().map(TransferResp::from).collect(),
            history_degraded: entry.history_degraded,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Healthz {
    pub status: String,
    pub store_ok: bool,
    pub storage: String,
    pub addressing: String,
    pub version: String,
}

// -------- 处理函数 --------

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Service health, wrapped in {code, message, data}", body = Healthz))
)]
pub async fn healthz(State(st): State<Arc<AppState>>) -> ApiResult<Healthz> {
    let store_ok = st.engine.store().health_check().await.is_ok();
    let status = if store_ok { "ok" } else { "degraded" };
    if !store_ok {
        tracing::warn!("healthz: ledger store health check failed");
    }

    success_response(Healthz {
        status: status.into(),
        store_ok,
        storage: st.config.ledger.storage.clone(),
        addressing: st.addressing.as_str().into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

#[utoipa::path(
    post,
    path = "/wallet",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Created wallet", body = WalletResp),
        (status = 401, description = "Unauthorized", body = crate::error_body::ErrorBodyDoc),
        (status = 503, description = "Store unavailable", body = crate::error_body::ErrorBodyDoc)
    )
)]
pub async fn create_wallet(
    State(st): State<Arc<AppState>>,
    trace_id: TraceId,
    auth: JwtAuthContext,
) -> ApiResult<WalletResp> {
    let wallet = st
        .engine
        .create_wallet(auth.owner)
        .await
        .map_err(|e| AppError::from(e).with_trace_id(trace_id.0))?;
    success_response(wallet.into())
}

#[utoipa::path(
    get,
    path = "/wallets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's wallets with outgoing transfers", body = [WalletWithHistoryResp]),
        (status = 401, description = "Unauthorized", body = crate::error_body::ErrorBodyDoc)
    )
)]
pub async fn get_wallets(
    State(st): State<Arc<AppState>>,
    trace_id: TraceId,
    auth: JwtAuthContext,
) -> ApiResult<Vec<WalletWithHistoryResp>> {
    let wallets = st
        .engine
        .list_wallets(Some(auth.owner))
        .await
        .map_err(|e| AppError::from(e).with_trace_id(trace_id.0))?;
    success_response(wallets.into_iter().map(Into::into).collect())
}

#[utoipa::path(
    get,
    path = "/list_wallets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All wallets (admin only)", body = [WalletWithHistoryResp]),
        (status = 401, description = "Unauthorized", body = crate::error_body::ErrorBodyDoc),
        (status = 403, description = "Admin role required", body = crate::error_body::ErrorBodyDoc)
    )
)]
pub async fn list_all_wallets(
    State(st): State<Arc<AppState>>,
    trace_id: TraceId,
    auth: JwtAuthContext,
) -> ApiResult<Vec<WalletWithHistoryResp>> {
    require_admin(&auth).map_err(|e| e.with_trace_id(trace_id.0.clone()))?;

    let wallets = st
        .engine
        .list_wallets(None)
        .await
        .map_err(|e| AppError::from(e).with_trace_id(trace_id.0))?;
    success_response(wallets.into_iter().map(Into::into).collect())
}

#[utoipa::path(
    post,
    path = "/replenish",
    request_body = ReplenishReq,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Replenished wallet", body = WalletResp),
        (status = 400, description = "Invalid amount or body", body = crate::error_body::ErrorBodyDoc),
        (status = 404, description = "Wallet not found or not owned", body = crate::error_body::ErrorBodyDoc)
    )
)]
pub async fn replenish(
    State(st): State<Arc<AppState>>,
    trace_id: TraceId,
    auth: JwtAuthContext,
    body: Result<Json<ReplenishReq>, JsonRejection>,
) -> ApiResult<WalletResp> {
    let attach = |e: AppError| e.with_trace_id(trace_id.0.clone());

    let Json(req) = body.map_err(|e| attach(e.into()))?;
    let wallet = req.wallet_id.resolve(st.addressing).map_err(attach)?;

    let updated = st
        .engine
        .replenish(auth.owner, &wallet, req.amount)
        .await
        .map_err(|e| attach(e.into()))?;
    success_response(updated.into())
}

#[utoipa::path(
    post,
    path = "/transfer",
    request_body = TransferReq,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Committed transfer", body = TransferResp),
        (status = 400, description = "Invalid amount or body", body = crate::error_body::ErrorBodyDoc),
        (status = 404, description = "Wallet not found or not owned", body = crate::error_body::ErrorBodyDoc),
        (status = 409, description = "Insufficient balance", body = crate::error_body::ErrorBodyDoc)
    )
)]
pub async fn transfer(
    State(st): State<Arc<AppState>>,
    trace_id: TraceId,
    auth: JwtAuthContext,
    body: Result<Json<TransferReq>, JsonRejection>,
) -> ApiResult<TransferResp> {
    let attach = |e: AppError| e.with_trace_id(trace_id.0.clone());

    let Json(req) = body.map_err(|e| attach(e.into()))?;
    let from = req.from_wallet_id.resolve(st.addressing).map_err(attach)?;
    let to = req.to_wallet_id.resolve(st.addressing).map_err(attach)?;

    let record = st
        .engine
        .transfer(auth.owner, &from, &to, req.amount)
        .await
        .map_err(|e| attach(e.into()))?;
    success_response(record.into())
}
