use thiserror::Error;

use crate::repository::StoreError;

/// 账本引擎错误
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 金额非正数或会导致余额溢出
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// 钱包不存在或不属于调用者
    #[error("invalid wallet: {0}")]
    InvalidWallet(String),

    #[error("insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    /// 底层存储故障（总是向上传递）
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl LedgerError {
    /// 错误种类（用于日志和指标）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidWallet(_) => "invalid_wallet",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// 是否为业务规则拒绝（区别于存储故障）
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::StoreUnavailable(_))
    }
}
