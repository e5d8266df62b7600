// 账本 PostgreSQL 实现
//
// 并发控制：
// - 扣款/入账前用 SELECT ... FOR UPDATE 锁定相关钱包行（按 id 升序，避免双向转账死锁）
// - 扣款本身是条件更新（balance + delta >= 0），表上还有 CHECK (balance >= 0)
// - sqlx::Transaction 在 drop 时自动回滚

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};

use super::{AtomicUnit, LedgerStore, StoreError};
use crate::{
    domain::{NewTransfer, NewWallet, OwnerId, TransferRecord, Wallet, WalletRef},
    infrastructure::db::PgPool,
};

// ============ 行模型 ============

#[derive(Debug, FromRow)]
struct WalletRow {
    id: i64,
    owner: i64,
    code: String,
    created_at: DateTime<Utc>,
    balance: i64,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            owner: OwnerId(row.owner),
            code: row.code,
            created_at: row.created_at,
            balance: row.balance,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransferRow {
    id: i64,
    amount: i64,
    from_wallet_id: i64,
    from_wallet_code: String,
    to_wallet_id: i64,
    to_wallet_code: String,
    created_at: DateTime<Utc>,
}

impl From<TransferRow> for TransferRecord {
    fn from(row: TransferRow) -> Self {
        TransferRecord {
            id: row.id,
            amount: row.amount,
            from_wallet_id: row.from_wallet_id,
            from_wallet_code: row.from_wallet_code,
            to_wallet_id: row.to_wallet_id,
            to_wallet_code: row.to_wallet_code,
            created_at: row.created_at,
        }
    }
}

// ============ PostgreSQL 实现 ============

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgAtomicUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AtomicUnit for PgAtomicUnit {
    async fn insert_wallet(&mut self, wallet: NewWallet) -> Result<Wallet, StoreError> {
        let rec = sqlx::query_as::<_, WalletRow>(
            r#"
            INSERT INTO wallets (owner, code)
            VALUES ($1, $2)
            RETURNING id, owner, code, created_at, balance
            "#,
        )
        .bind(wallet.owner.0)
        .bind(wallet.code)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(rec.into())
    }

    async fn lock_owned_wallet(
        &mut self,
        owner: OwnerId,
        wallet: &WalletRef,
    ) -> Result<Option<Wallet>, StoreError> {
        let rec = match wallet {
            WalletRef::Id(id) => {
                sqlx::query_as::<_, WalletRow>(
                    r#"
                    SELECT id, owner, code, created_at, balance
                    FROM wallets
                    WHERE id = $1 AND owner = $2
                    FOR UPDATE
                    "#,
                )
                .bind(*id)
                .bind(owner.0)
                .fetch_optional(&mut *self.tx)
                .await?
            }
            WalletRef::Code(code) => {
                sqlx::query_as::<_, WalletRow>(
                    r#"
                    SELECT id, owner, code, created_at, balance
                    FROM wallets
                    WHERE code = $1 AND owner = $2
                    FOR UPDATE
                    "#,
                )
                .bind(code.as_str())
                .bind(owner.0)
                .fetch_optional(&mut *self.tx)
                .await?
            }
        };
        Ok(rec.map(Wallet::from))
    }

    async fn lock_wallets(&mut self, wallets: &[WalletRef]) -> Result<Vec<Wallet>, StoreError> {
        let mut ids: Vec<i64> = Vec::new();
        let mut codes: Vec<String> = Vec::new();
        for r in wallets {
            match r {
                WalletRef::Id(id) => ids.push(*id),
                WalletRef::Code(code) => codes.push(code.clone()),
            }
        }

        let recs = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT id, owner, code, created_at, balance
            FROM wallets
            WHERE id = ANY($1) OR code = ANY($2)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .bind(codes)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(recs.into_iter().map(Wallet::from).collect())
    }

    async fn adjust_balance(&mut self, wallet_id: i64, delta: i64) -> Result<i64, StoreError> {
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE wallets
            SET balance = balance + $2
            WHERE id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(wallet_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some((balance,)) = updated {
            return Ok(balance);
        }

        // 区分钱包不存在与余额不足
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        match exists {
            Some(_) => Err(StoreError::BalanceConstraint { wallet_id }),
            None => Err(StoreError::WalletNotFound(wallet_id.to_string())),
        }
    }

    async fn append_transfer(
        &mut self,
        transfer: NewTransfer,
    ) -> Result<TransferRecord, StoreError> {
        let rec = sqlx::query_as::<_, TransferRow>(
            r#"
            WITH ins AS (
                INSERT INTO transfers (amount, from_wallet, to_wallet)
                VALUES ($1, $2, $3)
                RETURNING id, amount, from_wallet, to_wallet, created_at
            )
            SELECT
                ins.id,
                ins.amount,
                ins.from_wallet AS from_wallet_id,
                fw.code AS from_wallet_code,
                ins.to_wallet AS to_wallet_id,
                tw.code AS to_wallet_code,
                ins.created_at
            FROM ins
            JOIN wallets fw ON fw.id = ins.from_wallet
            JOIN wallets tw ON tw.id = ins.to_wallet
            "#,
        )
        .bind(transfer.amount)
        .bind(transfer.from_wallet_id)
        .bind(transfer.to_wallet_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(rec.into())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgAtomicUnit { tx }))
    }

    async fn get_wallet(&self, wallet: &WalletRef) -> Result<Option<Wallet>, StoreError> {
        let rec = match wallet {
            WalletRef::Id(id) => {
                sqlx::query_as::<_, WalletRow>(
                    "SELECT id, owner, code, created_at, balance FROM wallets WHERE id = $1",
                )
                .bind(*id)
                .fetch_optional(&self.pool)
                .await?
            }
            WalletRef::Code(code) => {
                sqlx::query_as::<_, WalletRow>(
                    "SELECT id, owner, code, created_at, balance FROM wallets WHERE code = $1",
                )
                .bind(code.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(rec.map(Wallet::from))
    }

    async fn list_wallets(&self, owner: Option<OwnerId>) -> Result<Vec<Wallet>, StoreError> {
        let recs = match owner {
            None => {
                sqlx::query_as::<_, WalletRow>(
                    r#"
                    SELECT id, owner, code, created_at, balance
                    FROM wallets
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
            Some(owner) => {
                sqlx::query_as::<_, WalletRow>(
                    r#"
                    SELECT id, owner, code, created_at, balance
                    FROM wallets
                    WHERE owner = $1
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .bind(owner.0)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(recs.into_iter().map(Wallet::from).collect())
    }

    async fn list_outgoing(&self, wallet_id: i64) -> Result<Vec<TransferRecord>, StoreError> {
        let recs = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT
                t.id,
                t.amount,
                t.from_wallet AS from_wallet_id,
                fw.code AS from_wallet_code,
                t.to_wallet AS to_wallet_id,
                tw.code AS to_wallet_code,
                t.created_at
            FROM transfers t
            JOIN wallets fw ON fw.id = t.from_wallet
            JOIN wallets tw ON tw.id = t.to_wallet
            WHERE t.from_wallet = $1
            ORDER BY t.created_at, t.id
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs.into_iter().map(TransferRecord::from).collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::infrastructure::db::health_check(&self.pool).await?;
        Ok(())
    }
}
