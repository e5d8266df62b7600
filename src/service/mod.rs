pub mod error;
pub mod ledger_engine; // 账本核心：创建/充值/转账/列表
pub mod wallet_aggregator; // 钱包历史并发聚合

pub use error::LedgerError;
pub use ledger_engine::{CodeGenerator, LedgerEngine, LedgerSettings};
pub use wallet_aggregator::{HistoryPolicy, WalletAggregator};
