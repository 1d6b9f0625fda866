//! 领域服务
//!
//! 跨多个仓储的操作：发放、撤销、令牌签发与背包。权限判断由 HTTP 层完成，
//! 这里假定调用方已经通过了对象级权限检查。

pub mod backpack;
pub mod issuance;
pub mod revocation;
pub mod tokens;

pub use backpack::BackpackService;
pub use issuance::{AssertionChanges, AssertionDraft, BadgeClassRef, IssuanceService};
pub use revocation::RevocationService;
pub use tokens::{IssuerToken, TokenService};

use tracing::warn;

use crate::models::BadgeInstance;
use crate::publisher::UserPublisher;
use crate::repository::Repositories;

/// 找到认领该实例接收者的用户并发布变更；无人认领时什么也不做
pub(crate) async fn publish_recipient_owner(
    repos: &Repositories,
    publisher: &dyn UserPublisher,
    instance: &BadgeInstance,
) {
    match repos
        .users
        .find_account_by_identifier(
            &instance.recipient_identifier,
            instance.recipient_type.identifier_type(),
        )
        .await
    {
        Ok(Some(owner)) => publisher.publish_user(owner.entity_id()).await,
        Ok(None) => {}
        Err(e) => warn!(assertion = %instance.entity_id, error = %e, "查找接收者所属用户失败"),
    }
}
