//! 测试辅助模块
//! 提供内存账本、测试路由、令牌签发与故障注入存储

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use walletledger::{
    api,
    app_state::AppState,
    config::Config,
    domain::{NewTransfer, NewWallet, OwnerId, TransferRecord, Wallet, WalletRef},
    infrastructure::jwt::{JwtKeys, TokenKind, TokenPayload},
    repository::{AtomicUnit, LedgerStore, MemoryLedgerStore, StoreError},
    service::{LedgerEngine, LedgerSettings},
};

pub const ACCESS_SECRET: &str = "test_access_secret";
pub const REFRESH_SECRET: &str = "test_refresh_secret";

/// 测试数据库URL（仅 #[ignore] 的 Postgres 测试使用）
pub fn test_database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost:5432/walletledger_test".into())
}

pub fn memory_engine() -> Arc<LedgerEngine> {
    Arc::new(LedgerEngine::new(
        Arc::new(MemoryLedgerStore::new()),
        LedgerSettings::default(),
    ))
}

pub fn engine_with(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Arc<LedgerEngine> {
    Arc::new(LedgerEngine::new(store, settings))
}

/// 测试配置：内存存储 + 固定密钥
pub fn test_config(addressing: &str) -> Config {
    let mut config = Config::default();
    config.jwt.access_secret = ACCESS_SECRET.into();
    config.jwt.refresh_secret = REFRESH_SECRET.into();
    config.ledger.storage = "memory".into();
    config.ledger.wallet_addressing = addressing.into();
    config
}

pub fn build_app(engine: Arc<LedgerEngine>, addressing: &str) -> Router {
    let config = Arc::new(test_config(addressing));
    let state = AppState::new(engine, config).expect("test app state");
    api::routes(Arc::new(state))
}

pub fn keys() -> JwtKeys {
    JwtKeys::new(ACCESS_SECRET, REFRESH_SECRET)
}

pub fn access_token(id: i64, role: &str) -> String {
    let payload = TokenPayload {
        id,
        iin: format!("{:012}", id),
        username: format!("user{}", id),
        role: role.into(),
    };
    keys()
        .issue_token(&payload, TokenKind::Access, 300)
        .expect("issue token")
}

/// 资金总量（所有钱包余额之和）
pub async fn total_balance(engine: &LedgerEngine) -> i64 {
    engine
        .list_wallets(None)
        .await
        .expect("list wallets")
        .iter()
        .map(|w| w.wallet.balance)
        .sum()
}

pub async fn balance_of(engine: &LedgerEngine, wallet_id: i64) -> i64 {
    engine
        .store()
        .get_wallet(&WalletRef::Id(wallet_id))
        .await
        .expect("get wallet")
        .expect("wallet exists")
        .balance
}

// ============ 故障注入存储 ============

/// 包装内存存储：可让指定钱包的历史查询失败或变慢，或让追加转账记录变慢
#[derive(Clone, Default)]
pub struct FaultyStore {
    inner: MemoryLedgerStore,
    pub failing_history: HashSet<i64>,
    pub history_delays: HashMap<i64, Duration>,
    pub append_delay: Option<Duration>,
}

impl FaultyStore {
    pub fn new(inner: MemoryLedgerStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }
}

struct FaultyUnit {
    inner: Box<dyn AtomicUnit>,
    append_delay: Option<Duration>,
}

#[async_trait]
impl AtomicUnit for FaultyUnit {
    async fn insert_wallet(&mut self, wallet: NewWallet) -> Result<Wallet, StoreError> {
        self.inner.insert_wallet(wallet).await
    }

    async fn lock_owned_wallet(
        &mut self,
        owner: OwnerId,
        wallet: &WalletRef,
    ) -> Result<Option<Wallet>, StoreError> {
        self.inner.lock_owned_wallet(owner, wallet).await
    }

    async fn lock_wallets(&mut self, wallets: &[WalletRef]) -> Result<Vec<Wallet>, StoreError> {
        self.inner.lock_wallets(wallets).await
    }

    async fn adjust_balance(&mut self, wallet_id: i64, delta: i64) -> Result<i64, StoreError> {
        self.inner.adjust_balance(wallet_id, delta).await
    }

    async fn append_transfer(
        &mut self,
        transfer: NewTransfer,
    ) -> Result<TransferRecord, StoreError> {
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.append_transfer(transfer).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.abort().await
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, StoreError> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FaultyUnit {
            inner,
            append_delay: self.append_delay,
        }))
    }

    async fn get_wallet(&self, wallet: &WalletRef) -> Result<Option<Wallet>, StoreError> {
        self.inner.get_wallet(wallet).await
    }

    async fn list_wallets(&self, owner: Option<OwnerId>) -> Result<Vec<Wallet>, StoreError> {
        self.inner.list_wallets(owner).await
    }

    async fn list_outgoing(&self, wallet_id: i64) -> Result<Vec<TransferRecord>, StoreError> {
        if let Some(delay) = self.history_delays.get(&wallet_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_history.contains(&wallet_id) {
            return Err(StoreError::Unavailable(format!(
                "history shard for wallet {} offline",
                wallet_id
            )));
        }
        self.inner.list_outgoing(wallet_id).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}
