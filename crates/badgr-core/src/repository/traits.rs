//! 仓储 Trait 定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::PageRequest;
use crate::error::Result;
use crate::models::{
    AccessToken, Application, AssertionFilter, BackpackCollection, BadgeClass, BadgeInstance,
    IdentifierType, Issuer, IssuerStaff, NewAccessToken, NewBadgeClass, NewBadgeInstance,
    NewCollection, NewIssuer, StaffRole, User, UserAccount,
};

/// 用户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepositoryTrait: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<Option<User>>;
    async fn get_user_by_entity_id(&self, entity_id: &str) -> Result<Option<User>>;
    /// 用户及其全部身份标识
    async fn get_account(&self, user_id: i64) -> Result<Option<UserAccount>>;
    /// 按已验证身份标识查找用户（大小写不敏感）
    async fn find_account_by_identifier(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<Option<UserAccount>>;
    async fn create_user<'a>(
        &self,
        first_name: &str,
        last_name: &str,
        password_hash: Option<&'a str>,
    ) -> Result<User>;
    async fn add_identifier(
        &self,
        user_id: i64,
        identifier: &str,
        identifier_type: IdentifierType,
        verified: bool,
    ) -> Result<()>;
}

/// OAuth 应用与令牌仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthRepositoryTrait: Send + Sync {
    async fn get_application(&self, id: i64) -> Result<Option<Application>>;
    async fn get_application_by_client_id(&self, client_id: &str) -> Result<Option<Application>>;
    async fn create_application<'a>(
        &self,
        client_id: &str,
        client_secret_hash: Option<&'a str>,
        name: &str,
        user_id: Option<i64>,
        allowed_scopes: &str,
    ) -> Result<Application>;
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>>;
    async fn create_token(&self, token: NewAccessToken) -> Result<AccessToken>;
    /// 按 (user, application, scope) 查找令牌，不存在时用 defaults 创建；返回是否新建
    async fn get_or_create_token(&self, defaults: NewAccessToken) -> Result<(AccessToken, bool)>;
}

/// 发行方仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssuerRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Issuer>>;
    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<Issuer>>;
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Issuer>>;
    /// 用户担任任意角色的发行方
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Issuer>>;
    /// 创建发行方，owner 非空时同时写入 owner 成员关系
    async fn create(&self, issuer: NewIssuer, owner_id: Option<i64>) -> Result<Issuer>;
    async fn update(&self, issuer: &Issuer) -> Result<Issuer>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn list_staff(&self, issuer_id: i64) -> Result<Vec<IssuerStaff>>;
    async fn get_or_create_staff(
        &self,
        issuer_id: i64,
        user_id: i64,
        role: StaffRole,
    ) -> Result<(IssuerStaff, bool)>;
}

/// 徽章定义仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BadgeClassRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<BadgeClass>>;
    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BadgeClass>>;
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<BadgeClass>>;
    /// 发行方内按名称查找（大小写不敏感），可能返回多条
    async fn find_by_name(&self, issuer_id: i64, name: &str) -> Result<Vec<BadgeClass>>;
    async fn list_for_issuer(&self, issuer_id: i64) -> Result<Vec<BadgeClass>>;
    /// 用户担任成员的全部发行方下的徽章定义
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<BadgeClass>>;
    async fn create(&self, badge_class: NewBadgeClass) -> Result<BadgeClass>;
    async fn update(&self, badge_class: &BadgeClass) -> Result<BadgeClass>;
    async fn delete(&self, id: i64) -> Result<()>;
}

/// 徽章实例仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssertionRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<BadgeInstance>>;
    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BadgeInstance>>;
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<BadgeInstance>>;
    /// 按创建时间倒序
    async fn list(
        &self,
        filter: &AssertionFilter,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Vec<BadgeInstance>>;
    /// 背包：接收者属于给定标识、未撤销、未拒绝
    async fn list_for_recipients(&self, identifiers: &[String]) -> Result<Vec<BadgeInstance>>;
    /// 变更流：对用户可见且 updated_at 晚于 since，按 (updated_at, id) 升序
    async fn list_changed_since(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Vec<BadgeInstance>>;
    /// 同一接收者是否已持有该徽章定义下未过期且未撤销的实例
    async fn has_current_award(
        &self,
        badgeclass_id: i64,
        recipient_identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    async fn create(&self, instance: NewBadgeInstance) -> Result<BadgeInstance>;
    /// 批量创建，任一失败则全部回滚
    async fn create_many(&self, instances: Vec<NewBadgeInstance>) -> Result<Vec<BadgeInstance>>;
    /// 写回可变字段并刷新 updated_at；不写撤销状态，已撤销的实例保持撤销
    async fn update(&self, instance: &BadgeInstance) -> Result<BadgeInstance>;
    /// 仅在未撤销时撤销，已撤销返回 AlreadyRevoked
    async fn revoke(&self, id: i64, reason: &str) -> Result<BadgeInstance>;
    async fn count_for_badgeclass(&self, badgeclass_id: i64) -> Result<i64>;
    async fn count_for_issuer(&self, issuer_id: i64) -> Result<i64>;
}

/// 收藏集仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectionRepositoryTrait: Send + Sync {
    async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<BackpackCollection>>;
    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BackpackCollection>>;
    async fn get_by_share_hash(&self, share_hash: &str) -> Result<Option<BackpackCollection>>;
    async fn create(&self, collection: NewCollection) -> Result<BackpackCollection>;
    /// 写回名称、描述、发布状态并整体替换实例列表
    async fn update(&self, collection: &BackpackCollection) -> Result<BackpackCollection>;
    async fn delete(&self, id: i64) -> Result<()>;
    /// 从所有收藏集中移除某个徽章实例
    async fn remove_assertion(&self, badge_instance_id: i64) -> Result<()>;
}
