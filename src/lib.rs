//! walletledger - 多用户钱包账本服务
//!
//! 钱包余额永不为负，转账原子提交，调用者只能操作自己的钱包

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod error_body;
pub mod infrastructure;
pub mod metrics;
pub mod repository;
pub mod service;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, AppErrorCode};
