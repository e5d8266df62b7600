//! 账本引擎
//!
//! 对外提供四个操作：CreateWallet / Replenish / Transfer / ListWallets。
//! 所有操作显式接收调用者身份（OwnerId），不从任何隐式上下文中推断。
//!
//! 并发语义：
//! - 余额检查与扣款在同一个原子单元内完成（先锁行，再检查，再条件扣款）
//! - 每个操作都有截止时间，超时或调用方取消时原子单元未提交即被 drop，整体回滚

use std::{future::Future, sync::Arc, time::Duration};

use super::{
    error::LedgerError,
    wallet_aggregator::{HistoryPolicy, WalletAggregator},
};
use crate::{
    config::LedgerConfig,
    domain::{
        generate_wallet_code, NewTransfer, NewWallet, OwnerId, TransferRecord, Wallet, WalletRef,
        WalletWithHistory,
    },
    metrics,
    repository::{AtomicUnit, LedgerStore, StoreError},
};

/// 钱包编码生成器
pub type CodeGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// 引擎运行参数
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// 编码冲突时的最大尝试次数
    pub code_generation_attempts: u32,
    /// 单个操作的截止时间
    pub operation_timeout: Duration,
    /// 历史查询并发上限
    pub history_concurrency: usize,
    pub history_policy: HistoryPolicy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            code_generation_attempts: 5,
            operation_timeout: Duration::from_secs(5),
            history_concurrency: 16,
            history_policy: HistoryPolicy::PartialResultsAllowed,
        }
    }
}

impl From<&LedgerConfig> for LedgerSettings {
    fn from(cfg: &LedgerConfig) -> Self {
        Self {
            code_generation_attempts: cfg.code_generation_attempts,
            operation_timeout: Duration::from_millis(cfg.operation_timeout_ms),
            history_concurrency: cfg.history_concurrency,
            history_policy: HistoryPolicy::from_allow_partial(cfg.allow_partial_history),
        }
    }
}

pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    aggregator: WalletAggregator,
    settings: LedgerSettings,
    code_generator: CodeGenerator,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        let aggregator = WalletAggregator::new(
            store.clone(),
            settings.history_concurrency,
            settings.history_policy,
        );
        Self {
            store,
            aggregator,
            settings,
            code_generator: Arc::new(generate_wallet_code),
        }
    }

    /// 替换编码生成器（测试编码冲突重试时使用）
    pub fn with_code_generator(mut self, generator: CodeGenerator) -> Self {
        self.code_generator = generator;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// 创建钱包（余额为0）
    ///
    /// 编码冲突视为可重试：每次重试使用新编码并开启新的原子单元
    pub async fn create_wallet(&self, owner: OwnerId) -> Result<Wallet, LedgerError> {
        self.with_deadline("create_wallet", self.create_wallet_with_retry(owner))
            .await
    }

    async fn create_wallet_with_retry(&self, owner: OwnerId) -> Result<Wallet, LedgerError> {
        let attempts = self.settings.code_generation_attempts.max(1);

        for attempt in 1..=attempts {
            let code = (self.code_generator)();
            let mut unit = self.store.begin().await?;

            match unit.insert_wallet(NewWallet { owner, code }).await {
                Ok(wallet) => {
                    unit.commit().await?;
                    tracing::info!(
                        owner = %owner,
                        wallet_id = wallet.id,
                        code = %wallet.code,
                        "wallet created"
                    );
                    return Ok(wallet);
                }
                Err(StoreError::Conflict(msg)) => {
                    abort_quietly(unit).await;
                    metrics::count_code_collision();
                    tracing::warn!(
                        owner = %owner,
                        attempt,
                        attempts,
                        "wallet code collision, retrying: {}",
                        msg
                    );
                }
                Err(err) => {
                    abort_quietly(unit).await;
                    return Err(err.into());
                }
            }
        }

        Err(StoreError::Unavailable(format!(
            "wallet code generation exhausted after {} attempts",
            attempts
        ))
        .into())
    }

    /// 充值：增加余额，不产生转账记录
    pub async fn replenish(
        &self,
        owner: OwnerId,
        wallet: &WalletRef,
        amount: i64,
    ) -> Result<Wallet, LedgerError> {
        self.with_deadline("replenish", async {
            ensure_positive(amount)?;

            let mut unit = self.store.begin().await?;
            let outcome = apply_replenish(unit.as_mut(), owner, wallet, amount).await;
            let updated = finish(unit, outcome).await?;

            metrics::add_replenished(amount);
            tracing::info!(
                owner = %owner,
                wallet_id = updated.id,
                amount,
                balance = updated.balance,
                "wallet replenished"
            );
            Ok(updated)
        })
        .await
    }

    /// 转账：扣款、入账、追加记录在同一原子单元内完成
    pub async fn transfer(
        &self,
        owner: OwnerId,
        from: &WalletRef,
        to: &WalletRef,
        amount: i64,
    ) -> Result<TransferRecord, LedgerError> {
        self.with_deadline("transfer", async {
            ensure_positive(amount)?;
            if from == to {
                return Err(LedgerError::InvalidWallet(format!(
                    "cannot transfer from {} to itself",
                    from
                )));
            }

            let mut unit = self.store.begin().await?;
            let outcome = apply_transfer(unit.as_mut(), owner, from, to, amount).await;
            let record = finish(unit, outcome).await?;

            metrics::add_transferred(amount);
            tracing::info!(
                owner = %owner,
                transfer_id = record.id,
                from_wallet_id = record.from_wallet_id,
                to_wallet_id = record.to_wallet_id,
                amount,
                "transfer committed"
            );
            Ok(record)
        })
        .await
    }

    /// 列出钱包及其转出历史
    ///
    /// `owner` 为 `None` 时返回全部钱包（仅供管理员路径使用）
    pub async fn list_wallets(
        &self,
        owner: Option<OwnerId>,
    ) -> Result<Vec<WalletWithHistory>, LedgerError> {
        self.with_deadline("list_wallets", async {
            let wallets = self.store.list_wallets(owner).await?;
            tracing::debug!(
                owner = ?owner,
                count = wallets.len(),
                "resolving transfer histories"
            );
            self.aggregator.attach_histories(wallets).await
        })
        .await
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        let timeout = self.settings.operation_timeout;
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(operation, ?timeout, "ledger operation timed out");
                Err(StoreError::Timeout(timeout).into())
            }
        };

        match &result {
            Ok(_) => metrics::count_ok(operation),
            Err(err) => {
                metrics::count_err(operation, err.kind());
                if err.is_rejection() {
                    tracing::info!(operation, error = %err, "ledger operation rejected");
                } else {
                    tracing::error!(operation, error = %err, "ledger operation failed");
                }
            }
        }
        result
    }
}

fn ensure_positive(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

fn ensure_credit_fits(wallet: &Wallet, amount: i64) -> Result<(), LedgerError> {
    if wallet.balance.checked_add(amount).is_none() {
        return Err(LedgerError::InvalidAmount(format!(
            "amount {} would overflow balance of wallet {}",
            amount, wallet.id
        )));
    }
    Ok(())
}

async fn apply_replenish(
    unit: &mut dyn AtomicUnit,
    owner: OwnerId,
    wallet: &WalletRef,
    amount: i64,
) -> Result<Wallet, LedgerError> {
    // 存在性与归属是同一次检查
    let mut target = unit
        .lock_owned_wallet(owner, wallet)
        .await?
        .ok_or_else(|| LedgerError::InvalidWallet(wallet.to_string()))?;

    ensure_credit_fits(&target, amount)?;
    target.balance = unit.adjust_balance(target.id, amount).await?;
    Ok(target)
}

async fn apply_transfer(
    unit: &mut dyn AtomicUnit,
    owner: OwnerId,
    from: &WalletRef,
    to: &WalletRef,
    amount: i64,
) -> Result<TransferRecord, LedgerError> {
    let locked = unit.lock_wallets(&[from.clone(), to.clone()]).await?;

    let source = locked
        .iter()
        .find(|w| from.matches(w) && w.owner == owner)
        .cloned()
        .ok_or_else(|| LedgerError::InvalidWallet(from.to_string()))?;
    let dest = locked
        .iter()
        .find(|w| to.matches(w))
        .cloned()
        .ok_or_else(|| LedgerError::InvalidWallet(to.to_string()))?;

    if source.id == dest.id {
        return Err(LedgerError::InvalidWallet(format!(
            "cannot transfer from {} to itself",
            from
        )));
    }

    // 行已加锁，这里读到的余额就是提交时的余额
    if source.balance < amount {
        return Err(LedgerError::InsufficientBalance {
            balance: source.balance,
            requested: amount,
        });
    }
    ensure_credit_fits(&dest, amount)?;

    match unit.adjust_balance(source.id, -amount).await {
        Ok(_) => {}
        Err(StoreError::BalanceConstraint { .. }) => {
            return Err(LedgerError::InsufficientBalance {
                balance: source.balance,
                requested: amount,
            });
        }
        Err(err) => return Err(err.into()),
    }
    unit.adjust_balance(dest.id, amount).await?;

    let record = unit
        .append_transfer(NewTransfer {
            amount,
            from_wallet_id: source.id,
            to_wallet_id: dest.id,
        })
        .await?;
    Ok(record)
}

/// 根据结果提交或回滚原子单元
async fn finish<T: Send>(
    unit: Box<dyn AtomicUnit>,
    outcome: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(err) => {
            abort_quietly(unit).await;
            Err(err)
        }
    }
}

async fn abort_quietly(unit: Box<dyn AtomicUnit>) {
    if let Err(abort_err) = unit.abort().await {
        tracing::warn!(error = %abort_err, "failed to abort atomic unit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryLedgerStore;

    fn engine() -> LedgerEngine {
        LedgerEngine::new(Arc::new(MemoryLedgerStore::new()), LedgerSettings::default())
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected_before_store() {
        let engine = engine();
        let owner = OwnerId(1);
        let w = engine.create_wallet(owner).await.unwrap();

        for amount in [0, -5] {
            let err = engine
                .replenish(owner, &WalletRef::Id(w.id), amount)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let engine = engine();
        let owner = OwnerId(1);
        let w = engine.create_wallet(owner).await.unwrap();
        engine
            .replenish(owner, &WalletRef::Id(w.id), 10)
            .await
            .unwrap();

        let err = engine
            .transfer(owner, &WalletRef::Id(w.id), &WalletRef::Id(w.id), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidWallet(_)));
    }

    #[tokio::test]
    async fn test_replenish_overflow_rejected() {
        let engine = engine();
        let owner = OwnerId(1);
        let w = engine.create_wallet(owner).await.unwrap();
        let wref = WalletRef::Id(w.id);
        engine.replenish(owner, &wref, i64::MAX).await.unwrap();

        let err = engine.replenish(owner, &wref, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        let after = engine.store().get_wallet(&wref).await.unwrap().unwrap();
        assert_eq!(after.balance, i64::MAX);
    }

    #[tokio::test]
    async fn test_code_collision_retried_with_fresh_code() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        // 前两次返回同一编码，第三次返回新编码
        let generator: CodeGenerator = Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                "100000000000".to_string()
            } else {
                "200000000000".to_string()
            }
        });
        let engine = engine().with_code_generator(generator);

        let first = engine.create_wallet(OwnerId(1)).await.unwrap();
        let second = engine.create_wallet(OwnerId(1)).await.unwrap();

        assert_eq!(first.code, "100000000000");
        assert_eq!(second.code, "200000000000");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_code_generation_exhaustion_is_store_unavailable() {
        let generator: CodeGenerator = Arc::new(|| "300000000000".to_string());
        let settings = LedgerSettings {
            code_generation_attempts: 3,
            ..LedgerSettings::default()
        };
        let engine = LedgerEngine::new(Arc::new(MemoryLedgerStore::new()), settings)
            .with_code_generator(generator);

        engine.create_wallet(OwnerId(1)).await.unwrap();
        let err = engine.create_wallet(OwnerId(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable(StoreError::Unavailable(_))));
        assert_eq!(engine.list_wallets(None).await.unwrap().len(), 1);
    }

    #[test]
    fn test_settings_from_config() {
        let cfg = LedgerConfig {
            storage: "memory".into(),
            wallet_addressing: "code".into(),
            code_generation_attempts: 7,
            history_concurrency: 4,
            allow_partial_history: false,
            operation_timeout_ms: 250,
        };
        let settings = LedgerSettings::from(&cfg);
        assert_eq!(settings.code_generation_attempts, 7);
        assert_eq!(settings.operation_timeout, Duration::from_millis(250));
        assert_eq!(settings.history_policy, HistoryPolicy::FailFast);
    }
}
