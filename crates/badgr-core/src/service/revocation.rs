//! 徽章实例撤销

use std::sync::Arc;

use tracing::{info, instrument};

use badgr_shared::observability::metrics;

use super::publish_recipient_owner;
use crate::error::{CoreError, Result};
use crate::models::BadgeInstance;
use crate::publisher::UserPublisher;
use crate::repository::Repositories;

pub struct RevocationService {
    repos: Repositories,
    publisher: Arc<dyn UserPublisher>,
}

impl RevocationService {
    pub fn new(repos: Repositories, publisher: Arc<dyn UserPublisher>) -> Self {
        Self { repos, publisher }
    }

    /// 撤销并持久化；已撤销或原因为空时返回错误且不写入
    ///
    /// 持久化走条件更新，并发撤销只有一个成功
    #[instrument(skip(self, instance), fields(assertion = %instance.entity_id))]
    pub async fn revoke(&self, mut instance: BadgeInstance, reason: &str) -> Result<BadgeInstance> {
        if let Err(e) = instance.revoke(reason) {
            metrics::record_assertion_revocation("rejected");
            return Err(e);
        }
        let saved = match self.repos.assertions.revoke(instance.id, reason).await {
            Ok(saved) => saved,
            Err(e @ CoreError::AlreadyRevoked) => {
                metrics::record_assertion_revocation("rejected");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        info!(
            event = "BadgeInstanceRevoked",
            assertion = %saved.entity_id,
            reason = %reason,
            "Assertion revoked"
        );
        metrics::record_assertion_revocation("revoked");
        // 接收者背包缓存中的状态已过时
        publish_recipient_owner(&self.repos, self.publisher.as_ref(), &saved).await;
        Ok(saved)
    }
}
