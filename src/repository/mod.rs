//! 账本存储抽象层
//!
//! 核心引擎只依赖这里的两个 trait：
//! - `LedgerStore`：开启原子单元 + 只读查询
//! - `AtomicUnit`：在同一事务内对钱包/转账记录进行读写，提交或回滚
//!
//! `AtomicUnit` 被 drop 而未提交时必须整体回滚（调用方被取消的情况）。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    NewTransfer, NewWallet, OwnerId, TransferRecord, Wallet, WalletRef,
};

pub mod memory_ledger_store;
pub mod pg_ledger_store;

pub use memory_ledger_store::MemoryLedgerStore;
pub use pg_ledger_store::PgLedgerStore;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// 唯一约束冲突（例如钱包编码重复）
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    /// 条件扣款失败：余额将变为负数
    #[error("balance constraint violated for wallet {wallet_id}")]
    BalanceConstraint { wallet_id: i64 },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if let Some(code) = db_err.code() {
                // PostgreSQL unique_violation
                if code == "23505" {
                    return Self::Conflict(db_err.message().to_string());
                }
            }
        }
        Self::Database(err)
    }
}

/// 原子单元：一组要么全部提交、要么全部回滚的存储操作
#[async_trait]
pub trait AtomicUnit: Send {
    /// 插入新钱包（余额为0），返回存储分配的 id 与创建时间
    async fn insert_wallet(&mut self, wallet: NewWallet) -> Result<Wallet, StoreError>;

    /// 锁定并读取属于 owner 的钱包
    ///
    /// "存在" 与 "属于该 owner" 是同一次检查，任一不满足都返回 `None`
    async fn lock_owned_wallet(
        &mut self,
        owner: OwnerId,
        wallet: &WalletRef,
    ) -> Result<Option<Wallet>, StoreError>;

    /// 锁定并读取多个钱包，按 id 升序加锁，不存在的引用不出现在结果中
    async fn lock_wallets(&mut self, wallets: &[WalletRef]) -> Result<Vec<Wallet>, StoreError>;

    /// 调整余额，结果为负时返回 `BalanceConstraint`，返回新余额
    async fn adjust_balance(&mut self, wallet_id: i64, delta: i64) -> Result<i64, StoreError>;

    /// 追加转账记录
    async fn append_transfer(&mut self, transfer: NewTransfer)
        -> Result<TransferRecord, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}

/// 账本存储
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 开启原子单元
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, StoreError>;

    /// 读取单个钱包（已提交数据）
    async fn get_wallet(&self, wallet: &WalletRef) -> Result<Option<Wallet>, StoreError>;

    /// 列出钱包，按创建时间倒序（相同时间按 id 倒序）
    ///
    /// `owner` 为 `None` 时返回全部钱包（管理员路径）
    async fn list_wallets(&self, owner: Option<OwnerId>) -> Result<Vec<Wallet>, StoreError>;

    /// 列出某钱包作为转出方的全部转账，按时间正序
    async fn list_outgoing(&self, wallet_id: i64) -> Result<Vec<TransferRecord>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
