//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::WalletAddressing;

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// JWT配置（仅校验，不签发）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// CORS 允许的来源，未设置时允许任意来源
    #[serde(default)]
    pub cors_origin: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 账本配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// "postgres" or "memory"
    pub storage: String,
    /// "id" or "code"
    pub wallet_addressing: String,
    pub code_generation_attempts: u32,
    pub history_concurrency: usize,
    pub allow_partial_history: bool,
    pub operation_timeout_ms: u64,
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_SOURCE"))
                .unwrap_or_else(|_| "postgres://postgres@localhost:5432/walletledger".into()),
            max_connections: env_parse("DB_MAX_CONNS").unwrap_or(16),
            min_connections: env_parse("DB_MIN_CONNS").unwrap_or(2),
            acquire_timeout_secs: env_parse("DB_ACQ_TIMEOUT_SECS").unwrap_or(5),
            idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT_SECS").unwrap_or(300),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            // 空值会在 validate 中被拒绝
            access_secret: std::env::var("ACCESS_SECRET").unwrap_or_default(),
            refresh_secret: std::env::var("REFRESH_SECRET").unwrap_or_default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
            let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
            format!("0.0.0.0:{}", port)
        });
        Self {
            bind_addr,
            cors_origin: std::env::var("ORIGIN").ok().filter(|s| !s.is_empty()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage: std::env::var("LEDGER_STORAGE").unwrap_or_else(|_| "postgres".into()),
            wallet_addressing: std::env::var("WALLET_ADDRESSING").unwrap_or_else(|_| "id".into()),
            code_generation_attempts: env_parse("LEDGER_CODE_ATTEMPTS").unwrap_or(5),
            history_concurrency: env_parse("LEDGER_HISTORY_CONCURRENCY").unwrap_or(16),
            allow_partial_history: std::env::var("LEDGER_ALLOW_PARTIAL_HISTORY")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            operation_timeout_ms: env_parse("LEDGER_OPERATION_TIMEOUT_MS").unwrap_or(5000),
        }
    }
}

impl LedgerConfig {
    pub fn storage_backend(&self) -> Result<StorageBackend> {
        match self.storage.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("LEDGER_STORAGE must be 'postgres' or 'memory', got '{}'", other),
        }
    }

    pub fn addressing(&self) -> Result<WalletAddressing> {
        WalletAddressing::parse(&self.wallet_addressing).with_context(|| {
            format!(
                "WALLET_ADDRESSING must be 'id' or 'code', got '{}'",
                self.wallet_addressing
            )
        })
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            ledger: LedgerConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                // 文件中缺省的整节仍取环境变量
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let backend = self.ledger.storage_backend()?;
        self.ledger.addressing()?;

        if backend == StorageBackend::Postgres
            && !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
        }

        if self.jwt.access_secret.is_empty() {
            anyhow::bail!("ACCESS_SECRET must not be empty");
        }
        if self.jwt.refresh_secret.is_empty() {
            anyhow::bail!("REFRESH_SECRET must not be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.ledger.code_generation_attempts == 0 {
            anyhow::bail!("ledger.code_generation_attempts must be positive");
        }
        if self.ledger.history_concurrency == 0 {
            anyhow::bail!("ledger.history_concurrency must be positive");
        }
        if self.ledger.operation_timeout_ms == 0 {
            anyhow::bail!("ledger.operation_timeout_ms must be positive");
        }

        Ok(())
    }
}
