//! 钱包与转账领域模型
//!
//! 钱包同时拥有两种寻址方式：
//! - 数据库自增主键（surrogate id）
//! - 12位随机数字编码（code）
//!
//! 具体使用哪一种由配置决定，并且只在API边界解析一次，核心引擎只认 `WalletRef`。

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 钱包编码长度（固定12位数字）
pub const WALLET_CODE_LENGTH: usize = 12;

/// 钱包所有者（来自认证层的主体ID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 钱包引用：引擎和存储层之间传递的不透明钱包标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WalletRef {
    Id(i64),
    Code(String),
}

impl WalletRef {
    /// 判断引用是否指向给定钱包
    pub fn matches(&self, wallet: &Wallet) -> bool {
        match self {
            WalletRef::Id(id) => wallet.id == *id,
            WalletRef::Code(code) => wallet.code == *code,
        }
    }
}

impl fmt::Display for WalletRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletRef::Id(id) => write!(f, "id:{}", id),
            WalletRef::Code(code) => write!(f, "code:{}", code),
        }
    }
}

/// 寻址方案（决定API层如何解释请求中的钱包标识）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletAddressing {
    /// 按自增主键寻址
    Id,
    /// 按12位编码寻址
    Code,
}

impl WalletAddressing {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Some(Self::Id),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Code => "code",
        }
    }
}

/// 钱包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub owner: OwnerId,
    pub code: String,
    pub created_at: DateTime<Utc>,
    /// 余额（最小货币单位，永不为负）
    pub balance: i64,
}

/// 待创建的钱包（id 与时间戳由存储分配）
#[derive(Debug, Clone)]
pub struct NewWallet {
    pub owner: OwnerId,
    pub code: String,
}

/// 转账记录（写入后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: i64,
    pub amount: i64,
    pub from_wallet_id: i64,
    pub from_wallet_code: String,
    pub to_wallet_id: i64,
    pub to_wallet_code: String,
    pub created_at: DateTime<Utc>,
}

/// 待追加的转账记录
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub amount: i64,
    pub from_wallet_id: i64,
    pub to_wallet_id: i64,
}

/// 带转出历史的钱包（列表接口输出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletWithHistory {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub transfers: Vec<TransferRecord>,
    /// 历史查询失败并被降级为空列表
    pub history_degraded: bool,
}

/// 生成12位随机数字钱包编码
pub fn generate_wallet_code() -> String {
    let mut rng = rand::thread_rng();
    (0..WALLET_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// 校验钱包编码格式
pub fn is_valid_wallet_code(code: &str) -> bool {
    code.len() == WALLET_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_wallet() -> Wallet {
        Wallet {
            id: 7,
            owner: OwnerId(1),
            code: "000000000007".into(),
            created_at: Utc::now(),
            balance: 0,
        }
    }

    #[test]
    fn test_generated_code_format() {
        for _ in 0..100 {
            let code = generate_wallet_code();
            assert!(is_valid_wallet_code(&code), "bad code: {}", code);
        }
    }

    #[test]
    fn test_code_validation_rejects_malformed() {
        assert!(!is_valid_wallet_code("12345"));
        assert!(!is_valid_wallet_code("12345678901a"));
        assert!(!is_valid_wallet_code("1234567890123"));
    }

    #[test]
    fn test_wallet_ref_matches() {
        let w = sample_wallet();
        assert!(WalletRef::Id(7).matches(&w));
        assert!(WalletRef::Code("000000000007".into()).matches(&w));
        assert!(!WalletRef::Id(8).matches(&w));
    }

    #[test]
    fn test_addressing_parse() {
        assert_eq!(WalletAddressing::parse("CODE"), Some(WalletAddressing::Code));
        assert_eq!(WalletAddressing::parse(" id "), Some(WalletAddressing::Id));
        assert_eq!(WalletAddressing::parse("uuid"), None);
    }
}
