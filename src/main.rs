//! walletledger 主入口

use std::sync::Arc;

use anyhow::{Context, Result};
use walletledger::{
    api,
    app_state::AppState,
    config::{Config, StorageBackend},
    infrastructure::{db, logging},
    repository::{LedgerStore, MemoryLedgerStore, PgLedgerStore},
    service::{LedgerEngine, LedgerSettings},
};

#[tokio::main]
async fn main() -> Result<()> {
    // ✅ 1. 加载环境变量
    dotenvy::dotenv().ok();

    // ✅ 2. 加载配置（CONFIG_PATH 指向的 TOML 文件优先）
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;

    // ✅ 3. 初始化日志
    logging::init_logging(&config.logging)?;
    config.validate().context("invalid configuration")?;

    tracing::info!("🚀 Starting walletledger v{}", env!("CARGO_PKG_VERSION"));

    // ✅ 4. 选择存储后端
    let store = open_store(&config).await?;

    // ✅ 5. 组装账本引擎与应用状态
    let settings = LedgerSettings::from(&config.ledger);
    tracing::info!(
        addressing = %config.ledger.wallet_addressing,
        history_concurrency = settings.history_concurrency,
        history_policy = ?settings.history_policy,
        timeout_ms = config.ledger.operation_timeout_ms,
        "✅ Ledger engine configured"
    );
    let engine = Arc::new(LedgerEngine::new(store, settings));

    let bind_addr = config.server.bind_addr.clone();
    let state = Arc::new(AppState::new(engine, Arc::new(config))?);
    let app = api::routes(state);

    // ✅ 6. 启动服务器
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("🎉 Server listening on http://{}", bind_addr);
    tracing::info!("📖 Swagger UI: http://{}/docs", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn LedgerStore>> {
    match config.ledger.storage_backend()? {
        StorageBackend::Postgres => {
            let pool = db::init_pool(&config.database)
                .await
                .context("failed to connect to database")?;
            tracing::info!("✅ Database connected");

            // 生产环境建议单独运行迁移
            if std::env::var("SKIP_MIGRATIONS").is_err() {
                db::run_migrations(&pool)
                    .await
                    .context("database migrations failed")?;
            } else {
                tracing::info!("⏭️ Database migrations skipped (SKIP_MIGRATIONS=1)");
            }

            Ok(Arc::new(PgLedgerStore::new(pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("⚠️ Using in-memory ledger store, data is lost on restart");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        // 无法监听信号时保持运行
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
