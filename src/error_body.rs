use serde::Serialize;
use utoipa::ToSchema;

/// 错误响应体（仅用于 OpenAPI 文档）
#[derive(Serialize, ToSchema)]
pub struct ErrorBodyDoc {
    /// 例如 invalid_amount / wallet_not_found / insufficient_balance
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}
