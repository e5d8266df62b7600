use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::service::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorCode {
    // HTTP 基础错误码
    BadRequest,
    Unauthorized,
    Forbidden,

    // 业务错误码
    WalletNotFound,
    InsufficientBalance,
    InvalidAmount,
    ServiceUnavailable,
}

impl AppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppErrorCode::BadRequest => "bad_request",
            AppErrorCode::Unauthorized => "unauthorized",
            AppErrorCode::Forbidden => "forbidden",
            AppErrorCode::WalletNotFound => "wallet_not_found",
            AppErrorCode::InsufficientBalance => "insufficient_balance",
            AppErrorCode::InvalidAmount => "invalid_amount",
            AppErrorCode::ServiceUnavailable => "service_unavailable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
    pub trace_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.as_str(),
            message: &self.message,
            trace_id: self.trace_id.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    fn new(code: AppErrorCode, status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            status,
            trace_id: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::BadRequest, StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Unauthorized, StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Forbidden, StatusCode::FORBIDDEN, msg)
    }

    pub fn wallet_not_found(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::WalletNotFound, StatusCode::NOT_FOUND, msg)
    }

    pub fn insufficient_balance(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::InsufficientBalance, StatusCode::CONFLICT, msg)
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::InvalidAmount, StatusCode::BAD_REQUEST, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            AppErrorCode::ServiceUnavailable,
            StatusCode::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    /// 设置追踪ID
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::InvalidAmount(msg) => AppError::invalid_amount(msg.clone()),
            LedgerError::InvalidWallet(msg) => {
                AppError::wallet_not_found(format!("wallet not found: {}", msg))
            }
            LedgerError::InsufficientBalance { .. } => AppError::insufficient_balance(err.to_string()),
            LedgerError::StoreUnavailable(cause) => {
                // 存储细节只进日志，不返回给调用方
                tracing::error!(error = %cause, "ledger store unavailable");
                AppError::service_unavailable("service temporarily unavailable, please retry")
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::StoreError;

    #[test]
    fn test_ledger_error_status_mapping() {
        let cases = [
            (
                LedgerError::InvalidAmount("0".into()),
                StatusCode::BAD_REQUEST,
                "invalid_amount",
            ),
            (
                LedgerError::InvalidWallet("id:9".into()),
                StatusCode::NOT_FOUND,
                "wallet_not_found",
            ),
            (
                LedgerError::InsufficientBalance {
                    balance: 1,
                    requested: 2,
                },
                StatusCode::CONFLICT,
                "insufficient_balance",
            ),
            (
                LedgerError::StoreUnavailable(StoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
            ),
        ];

        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status, status);
            assert_eq!(app.code.as_str(), code);
        }
    }

    #[test]
    fn test_store_details_not_leaked() {
        let app: AppError =
            LedgerError::StoreUnavailable(StoreError::Unavailable("pg at 10.0.0.5".into())).into();
        assert!(!app.message.contains("10.0.0.5"));
    }
}
