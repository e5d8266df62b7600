use std::sync::Arc;

use crate::{
    config::Config, domain::WalletAddressing, infrastructure::jwt::JwtKeys,
    service::LedgerEngine,
};

/// 应用状态
/// 包含所有共享资源
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LedgerEngine>,
    pub jwt: JwtKeys,
    /// 请求体中钱包标识的解释方式
    pub addressing: WalletAddressing,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: Arc<LedgerEngine>, config: Arc<Config>) -> anyhow::Result<Self> {
        let addressing = config.ledger.addressing()?;
        Ok(Self {
            engine,
            jwt: JwtKeys::from_config(&config.jwt),
            addressing,
            config,
        })
    }
}
