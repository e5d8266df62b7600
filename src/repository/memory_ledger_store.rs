//! 内存账本存储
//!
//! 用于测试与本地开发（`LEDGER_STORAGE=memory`）。
//! 所有原子单元通过同一把异步互斥锁串行化（等价于 serializable 隔离），
//! 单元只暂存自己新建或修改过的行，commit 时合并进主表，drop/abort 时直接丢弃。

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{AtomicUnit, LedgerStore, StoreError};
use crate::domain::{NewTransfer, NewWallet, OwnerId, TransferRecord, Wallet, WalletRef};

#[derive(Debug, Default)]
struct LedgerTables {
    wallets: BTreeMap<i64, Wallet>,
    codes: HashMap<String, i64>,
    transfers: Vec<TransferRecord>,
    next_wallet_id: i64,
    next_transfer_id: i64,
}

impl LedgerTables {
    fn resolve(&self, wallet: &WalletRef) -> Option<&Wallet> {
        match wallet {
            WalletRef::Id(id) => self.wallets.get(id),
            WalletRef::Code(code) => self.codes.get(code).and_then(|id| self.wallets.get(id)),
        }
    }
}

/// 内存账本存储
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    tables: Arc<Mutex<LedgerTables>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 单元内尚未提交的改动
#[derive(Debug, Default)]
struct StagedRows {
    wallets: BTreeMap<i64, Wallet>,
    codes: HashMap<String, i64>,
    transfers: Vec<TransferRecord>,
    next_wallet_id: i64,
    next_transfer_id: i64,
}

struct MemoryAtomicUnit {
    guard: OwnedMutexGuard<LedgerTables>,
    staged: StagedRows,
}

impl MemoryAtomicUnit {
    fn new(guard: OwnedMutexGuard<LedgerTables>) -> Self {
        let staged = StagedRows {
            next_wallet_id: guard.next_wallet_id,
            next_transfer_id: guard.next_transfer_id,
            ..StagedRows::default()
        };
        Self { guard, staged }
    }

    /// 先读暂存行，再读已提交行
    fn wallet(&self, id: i64) -> Option<&Wallet> {
        self.staged
            .wallets
            .get(&id)
            .or_else(|| self.guard.wallets.get(&id))
    }

    fn code_taken(&self, code: &str) -> bool {
        self.staged.codes.contains_key(code) || self.guard.codes.contains_key(code)
    }

    fn resolve(&self, wallet: &WalletRef) -> Option<&Wallet> {
        match wallet {
            WalletRef::Id(id) => self.wallet(*id),
            WalletRef::Code(code) => self
                .staged
                .codes
                .get(code)
                .or_else(|| self.guard.codes.get(code))
                .and_then(|id| self.wallet(*id)),
        }
    }
}

#[async_trait]
impl AtomicUnit for MemoryAtomicUnit {
    async fn insert_wallet(&mut self, wallet: NewWallet) -> Result<Wallet, StoreError> {
        if self.code_taken(&wallet.code) {
            return Err(StoreError::Conflict(format!(
                "wallet code {} already exists",
                wallet.code
            )));
        }

        self.staged.next_wallet_id += 1;
        let rec = Wallet {
            id: self.staged.next_wallet_id,
            owner: wallet.owner,
            code: wallet.code,
            created_at: Utc::now(),
            balance: 0,
        };
        self.staged.codes.insert(rec.code.clone(), rec.id);
        self.staged.wallets.insert(rec.id, rec.clone());
        Ok(rec)
    }

    async fn lock_owned_wallet(
        &mut self,
        owner: OwnerId,
        wallet: &WalletRef,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(self.resolve(wallet).filter(|w| w.owner == owner).cloned())
    }

    async fn lock_wallets(&mut self, wallets: &[WalletRef]) -> Result<Vec<Wallet>, StoreError> {
        let mut found: Vec<Wallet> = wallets
            .iter()
            .filter_map(|r| self.resolve(r).cloned())
            .collect();
        found.sort_by_key(|w| w.id);
        found.dedup_by_key(|w| w.id);
        Ok(found)
    }

    async fn adjust_balance(&mut self, wallet_id: i64, delta: i64) -> Result<i64, StoreError> {
        let mut wallet = self
            .wallet(wallet_id)
            .cloned()
            .ok_or_else(|| StoreError::WalletNotFound(wallet_id.to_string()))?;

        let next = wallet
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::Unavailable(format!("balance overflow on {}", wallet_id)))?;
        if next < 0 {
            return Err(StoreError::BalanceConstraint { wallet_id });
        }
        wallet.balance = next;
        self.staged.wallets.insert(wallet_id, wallet);
        Ok(next)
    }

    async fn append_transfer(
        &mut self,
        transfer: NewTransfer,
    ) -> Result<TransferRecord, StoreError> {
        let from_code = self
            .wallet(transfer.from_wallet_id)
            .map(|w| w.code.clone())
            .ok_or_else(|| StoreError::WalletNotFound(transfer.from_wallet_id.to_string()))?;
        let to_code = self
            .wallet(transfer.to_wallet_id)
            .map(|w| w.code.clone())
            .ok_or_else(|| StoreError::WalletNotFound(transfer.to_wallet_id.to_string()))?;

        self.staged.next_transfer_id += 1;
        let rec = TransferRecord {
            id: self.staged.next_transfer_id,
            amount: transfer.amount,
            from_wallet_id: transfer.from_wallet_id,
            from_wallet_code: from_code,
            to_wallet_id: transfer.to_wallet_id,
            to_wallet_code: to_code,
            created_at: Utc::now(),
        };
        self.staged.transfers.push(rec.clone());
        Ok(rec)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryAtomicUnit { mut guard, staged } = *self;
        guard.wallets.extend(staged.wallets);
        guard.codes.extend(staged.codes);
        guard.transfers.extend(staged.transfers);
        guard.next_wallet_id = staged.next_wallet_id;
        guard.next_transfer_id = staged.next_transfer_id;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        // 暂存行随 self 一起丢弃
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryAtomicUnit::new(guard)))
    }

    async fn get_wallet(&self, wallet: &WalletRef) -> Result<Option<Wallet>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.resolve(wallet).cloned())
    }

    async fn list_wallets(&self, owner: Option<OwnerId>) -> Result<Vec<Wallet>, StoreError> {
        let tables = self.tables.lock().await;
        let mut wallets: Vec<Wallet> = tables
            .wallets
            .values()
            .filter(|w| owner.map_or(true, |o| w.owner == o))
            .cloned()
            .collect();
        wallets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(wallets)
    }

    async fn list_outgoing(&self, wallet_id: i64) -> Result<Vec<TransferRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transfers
            .iter()
            .filter(|t| t.from_wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_wallet(owner: i64, code: &str) -> NewWallet {
        NewWallet {
            owner: OwnerId(owner),
            code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_makes_changes_visible() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let w = unit.insert_wallet(new_wallet(1, "111111111111")).await.unwrap();
        unit.adjust_balance(w.id, 50).await.unwrap();
        unit.commit().await.unwrap();

        let got = store.get_wallet(&WalletRef::Id(w.id)).await.unwrap().unwrap();
        assert_eq!(got.balance, 50);
        assert_eq!(got.code, "111111111111");
    }

    #[tokio::test]
    async fn test_dropped_unit_rolls_back() {
        let store = MemoryLedgerStore::new();
        {
            let mut unit = store.begin().await.unwrap();
            unit.insert_wallet(new_wallet(1, "222222222222")).await.unwrap();
            // 未提交即 drop
        }
        assert!(store.list_wallets(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abort_discards_changes() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        unit.insert_wallet(new_wallet(1, "333333333333")).await.unwrap();
        unit.abort().await.unwrap();
        assert!(store.list_wallets(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        unit.insert_wallet(new_wallet(1, "444444444444")).await.unwrap();
        let err = unit
            .insert_wallet(new_wallet(2, "444444444444"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_negative_adjustment_rejected() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let w = unit.insert_wallet(new_wallet(1, "555555555555")).await.unwrap();
        unit.adjust_balance(w.id, 10).await.unwrap();
        let err = unit.adjust_balance(w.id, -11).await.unwrap_err();
        assert!(matches!(err, StoreError::BalanceConstraint { wallet_id } if wallet_id == w.id));
    }

    #[tokio::test]
    async fn test_lock_owned_wallet_checks_owner() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let w = unit.insert_wallet(new_wallet(1, "666666666666")).await.unwrap();
        assert!(unit
            .lock_owned_wallet(OwnerId(1), &WalletRef::Code(w.code.clone()))
            .await
            .unwrap()
            .is_some());
        assert!(unit
            .lock_owned_wallet(OwnerId(2), &WalletRef::Id(w.id))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unit_stages_only_touched_rows() {
        let store = MemoryLedgerStore::new();
        let mut seed = store.begin().await.unwrap();
        let a = seed.insert_wallet(new_wallet(1, "700000000001")).await.unwrap();
        let b = seed.insert_wallet(new_wallet(1, "700000000002")).await.unwrap();
        seed.adjust_balance(a.id, 100).await.unwrap();
        seed.adjust_balance(b.id, 100).await.unwrap();
        seed.append_transfer(NewTransfer {
            amount: 1,
            from_wallet_id: a.id,
            to_wallet_id: b.id,
        })
        .await
        .unwrap();
        seed.commit().await.unwrap();

        let mut unit = MemoryAtomicUnit::new(store.tables.clone().lock_owned().await);
        assert!(unit.staged.wallets.is_empty());
        assert!(unit.staged.transfers.is_empty());

        // 已提交的钱包可按编码解析，且只有被修改的行进入暂存
        let found = unit
            .lock_owned_wallet(OwnerId(1), &WalletRef::Code(b.code.clone()))
            .await
            .unwrap();
        assert_eq!(found.map(|w| w.id), Some(b.id));
        assert_eq!(unit.adjust_balance(a.id, -40).await.unwrap(), 60);
        assert_eq!(unit.staged.wallets.len(), 1);
        assert!(unit.code_taken(&b.code));

        Box::new(unit).commit().await.unwrap();

        let a_after = store.get_wallet(&WalletRef::Id(a.id)).await.unwrap().unwrap();
        let b_after = store.get_wallet(&WalletRef::Id(b.id)).await.unwrap().unwrap();
        assert_eq!(a_after.balance, 60);
        assert_eq!(b_after.balance, 100);
        assert_eq!(store.list_outgoing(a.id).await.unwrap().len(), 1);

        // 提交后 id 序列继续递增
        let mut next = store.begin().await.unwrap();
        let c = next.insert_wallet(new_wallet(2, "700000000003")).await.unwrap();
        assert!(c.id > b.id);
    }

    #[tokio::test]
    async fn test_list_wallets_newest_first_and_filtered() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let a = unit.insert_wallet(new_wallet(1, "000000000001")).await.unwrap();
        let b = unit.insert_wallet(new_wallet(2, "000000000002")).await.unwrap();
        let c = unit.insert_wallet(new_wallet(1, "000000000003")).await.unwrap();
        unit.commit().await.unwrap();

        let all: Vec<i64> = store
            .list_wallets(None)
            .await
            .unwrap()
            .iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(all, vec![c.id, b.id, a.id]);

        let mine: Vec<i64> = store
            .list_wallets(Some(OwnerId(1)))
            .await
            .unwrap()
            .iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(mine, vec![c.id, a.id]);
    }
}
