//! 认证模块
//!
//! OAuth 访问令牌对应的请求身份、scope 匹配、发行方对象级权限与密码处理

mod password;
pub mod permissions;
pub mod scopes;

pub use password::{hash_password, verify_password};
pub use permissions::{Access, IssuerRule};

use badgr_core::{AccessToken, Application, UserAccount};

use crate::error::{ApiError, Result};

/// 由 Bearer 中间件注入请求扩展的身份信息
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: UserAccount,
    pub token: AccessToken,
    /// 令牌所属的 OAuth 应用
    pub application: Option<Application>,
}

impl AuthContext {
    pub fn user_id(&self) -> i64 {
        self.account.id()
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.token.scopes()
    }

    /// 至少拥有一个已验证身份标识
    pub fn require_verified(&self) -> Result<()> {
        if self.account.is_verified() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "You must have a verified email address to perform this action.".to_string(),
            ))
        }
    }

    /// 令牌 scope 命中 `valid` 中任意一项
    pub fn require_scope(&self, valid: &[&str]) -> Result<()> {
        if scopes::has_scope(&self.scopes(), valid) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }

    /// 令牌可以作用于该发行方：`rw:issuer` 或 `rw:issuer:<entity_id>`
    pub fn require_entity_scope(&self, issuer_entity_id: &str) -> Result<()> {
        if scopes::has_entity_scope(&self.scopes(), issuer_entity_id) {
            Ok(())
        } else {
            Err(ApiError::NotFound)
        }
    }

    /// 令牌必须由 OAuth 应用签发
    pub fn require_application(&self) -> Result<&Application> {
        self.application.as_ref().ok_or_else(|| {
            ApiError::Forbidden("Authorization must be an OAuth application token.".to_string())
        })
    }
}
