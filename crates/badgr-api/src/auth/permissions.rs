//! 发行方对象级权限
//!
//! 权限由令牌 scope 与发行方成员角色共同决定，拒绝时一律返回 404，
//! 不向无权调用方确认对象是否存在。

use badgr_core::Repositories;
use badgr_core::models::{Issuer, StaffRole, role_of};

use super::AuthContext;
use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// 成员角色规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerRule {
    /// 读：任意成员；写：owner 或 editor
    Editor,
    /// 任意成员，发放徽章使用
    Staff,
}

impl IssuerRule {
    pub fn allows(&self, role: StaffRole, access: Access) -> bool {
        match (self, access) {
            (Self::Editor, Access::Write) => role.can_edit(),
            _ => true,
        }
    }
}

/// 检查请求者能否以 `access` 方式作用于发行方，返回其角色
pub async fn authorize_issuer(
    repos: &Repositories,
    auth: &AuthContext,
    issuer: &Issuer,
    rule: IssuerRule,
    access: Access,
) -> Result<StaffRole> {
    auth.require_entity_scope(&issuer.entity_id)?;

    let staff = repos.issuers.list_staff(issuer.id).await?;
    match role_of(&staff, auth.user_id()) {
        Some(role) if rule.allows(role, access) => Ok(role),
        _ => Err(ApiError::NotFound),
    }
}

/// 按 entity_id 加载发行方并完成权限检查
pub async fn issuer_for(
    repos: &Repositories,
    auth: &AuthContext,
    entity_id: &str,
    rule: IssuerRule,
    access: Access,
) -> Result<Issuer> {
    let issuer = repos
        .issuers
        .get_by_entity_id(entity_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize_issuer(repos, auth, &issuer, rule, access).await?;
    Ok(issuer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_rule() {
        assert!(IssuerRule::Editor.allows(StaffRole::Staff, Access::Read));
        assert!(!IssuerRule::Editor.allows(StaffRole::Staff, Access::Write));
        assert!(IssuerRule::Editor.allows(StaffRole::Editor, Access::Write));
        assert!(IssuerRule::Editor.allows(StaffRole::Owner, Access::Write));
    }

    #[test]
    fn test_staff_rule() {
        assert!(IssuerRule::Staff.allows(StaffRole::Staff, Access::Write));
        assert!(IssuerRule::Staff.allows(StaffRole::Staff, Access::Read));
    }
}
