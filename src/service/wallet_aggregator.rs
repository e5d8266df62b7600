//! 钱包历史聚合
//!
//! 对每个钱包并发查询转出历史（并发度有上限），等待全部查询完成后按输入顺序合并。

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::error::LedgerError;
use crate::{
    domain::{TransferRecord, Wallet, WalletWithHistory},
    repository::{LedgerStore, StoreError},
};

/// 单个钱包历史查询失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// 失败的钱包历史降级为空列表（标记 history_degraded），整体继续返回
    PartialResultsAllowed,
    /// 任一查询失败则整个列表请求失败（仍会等待所有查询结束）
    FailFast,
}

impl HistoryPolicy {
    pub fn from_allow_partial(allow_partial: bool) -> Self {
        if allow_partial {
            Self::PartialResultsAllowed
        } else {
            Self::FailFast
        }
    }
}

pub struct WalletAggregator {
    store: Arc<dyn LedgerStore>,
    concurrency: usize,
    policy: HistoryPolicy,
}

impl WalletAggregator {
    pub fn new(store: Arc<dyn LedgerStore>, concurrency: usize, policy: HistoryPolicy) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            policy,
        }
    }

    /// 为每个钱包附加转出历史，输出顺序与输入一致
    pub async fn attach_histories(
        &self,
        wallets: Vec<Wallet>,
    ) -> Result<Vec<WalletWithHistory>, LedgerError> {
        let store = &self.store;
        let mut outcomes: Vec<(usize, Wallet, Result<Vec<TransferRecord>, StoreError>)> =
            stream::iter(wallets.into_iter().enumerate())
                .map(|(idx, wallet)| async move {
                    let history = store.list_outgoing(wallet.id).await;
                    (idx, wallet, history)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        // 完成顺序不确定，按原始下标恢复顺序
        outcomes.sort_by_key(|(idx, _, _)| *idx);

        let mut merged = Vec::with_capacity(outcomes.len());
        let mut first_failure: Option<StoreError> = None;

        for (_, wallet, history) in outcomes {
            match history {
                Ok(transfers) => merged.push(WalletWithHistory {
                    wallet,
                    transfers,
                    history_degraded: false,
                }),
                Err(err) => match self.policy {
                    HistoryPolicy::PartialResultsAllowed => {
                        tracing::warn!(
                            wallet_id = wallet.id,
                            error = %err,
                            "transfer history lookup failed, returning empty history"
                        );
                        crate::metrics::count_degraded_history();
                        merged.push(WalletWithHistory {
                            wallet,
                            transfers: Vec::new(),
                            history_degraded: true,
                        });
                    }
                    HistoryPolicy::FailFast => {
                        tracing::error!(
                            wallet_id = wallet.id,
                            error = %err,
                            "transfer history lookup failed"
                        );
                        if first_failure.is_none() {
                            first_failure = Some(err);
                        }
                    }
                },
            }
        }

        if let Some(err) = first_failure {
            return Err(err.into());
        }
        Ok(merged)
    }
}
