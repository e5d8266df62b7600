//! 基于角色的权限控制（RBAC）
//!
//! 角色定义：
//! - admin: 管理员，可查看所有钱包
//! - 其他角色：只能操作自己的钱包

use super::jwt_extractor::JwtAuthContext;
use crate::error::AppError;

/// 角色权限定义
pub mod roles {
    pub use crate::infrastructure::jwt::ADMIN_ROLE as ADMIN;
}

/// 权限检查：要求特定角色
pub fn require_role(auth: &JwtAuthContext, required_role: &str) -> Result<(), AppError> {
    if auth.role != required_role {
        tracing::warn!(
            owner = %auth.owner,
            role = %auth.role,
            "RBAC: required role {} missing",
            required_role
        );
        return Err(AppError::forbidden(format!(
            "Required role: {}",
            required_role
        )));
    }
    Ok(())
}

/// 权限检查：要求管理员角色
pub fn require_admin(auth: &JwtAuthContext) -> Result<(), AppError> {
    require_role(auth, roles::ADMIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OwnerId;

    fn ctx(role: &str) -> JwtAuthContext {
        JwtAuthContext {
            owner: OwnerId(1),
            username: "u".into(),
            role: role.into(),
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&ctx("admin")).is_ok());
        let err = require_admin(&ctx("user")).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
    }
}
