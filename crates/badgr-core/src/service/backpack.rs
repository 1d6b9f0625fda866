//! 背包：接收者视角的徽章实例
//!
//! 列表按用户缓存在 Redis 中，任何改变用户背包内容的操作都会通过
//! [`UserPublisher`] 让缓存失效。

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use badgr_shared::cache::{Cache, CacheKey};
use badgr_shared::observability::metrics;

use crate::badgecheck::{BadgeCheck, ImportSource};
use crate::error::{CoreError, Result};
use crate::models::{Acceptance, BadgeInstance, UserAccount};
use crate::publisher::UserPublisher;
use crate::repository::Repositories;

pub struct BackpackService {
    repos: Repositories,
    publisher: Arc<dyn UserPublisher>,
    cache: Option<Arc<Cache>>,
    cache_ttl: Duration,
}

impl BackpackService {
    pub fn new(
        repos: Repositories,
        publisher: Arc<dyn UserPublisher>,
        cache: Option<Arc<Cache>>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repos,
            publisher,
            cache,
            cache_ttl,
        }
    }

    async fn load(&self, account: &UserAccount) -> Result<Vec<BadgeInstance>> {
        self.repos
            .assertions
            .list_for_recipients(&account.verified_identifiers())
            .await
    }

    /// 用户背包中的实例；Redis 不可用时直接查库
    #[instrument(skip(self, account), fields(user = %account.entity_id()))]
    pub async fn list(&self, account: &UserAccount) -> Result<Vec<BadgeInstance>> {
        let Some(cache) = &self.cache else {
            return self.load(account).await;
        };

        let key = CacheKey::backpack_assertions(account.entity_id());
        match cache
            .get_or_set(&key, self.cache_ttl, || self.load(account))
            .await
        {
            Ok(instances) => Ok(instances),
            Err(CoreError::Infrastructure(e)) => {
                warn!(key = %key, error = %e, "背包缓存不可用，回退到数据库");
                self.load(account).await
            }
            Err(e) => Err(e),
        }
    }

    /// 按 entity_id 取用户背包中的实例；不属于该用户、已撤销或已拒绝时返回 None
    pub async fn get(&self, account: &UserAccount, entity_id: &str) -> Result<Option<BadgeInstance>> {
        let Some(instance) = self.repos.assertions.get_by_entity_id(entity_id).await? else {
            return Ok(None);
        };
        let owned = !instance.revoked
            && instance.acceptance != Acceptance::Rejected
            && account.owns_recipient(&instance.recipient_identifier, instance.recipient_type);
        Ok(owned.then_some(instance))
    }

    /// 接受实例；每次调用恰好发布一次（owner 存在时）
    #[instrument(skip(self, instance), fields(assertion = %instance.entity_id))]
    pub async fn accept(
        &self,
        mut instance: BadgeInstance,
        owner_entity_id: Option<&str>,
    ) -> Result<BadgeInstance> {
        instance.accept();
        let saved = self.repos.assertions.update(&instance).await?;
        if let Some(owner) = owner_entity_id {
            self.publisher.publish_user(owner).await;
        }
        Ok(saved)
    }

    /// 拒绝实例并从用户所有收藏集中移除
    #[instrument(skip(self, account, instance), fields(assertion = %instance.entity_id))]
    pub async fn reject(&self, account: &UserAccount, mut instance: BadgeInstance) -> Result<()> {
        instance.reject();
        self.repos.assertions.update(&instance).await?;
        self.repos.collections.remove_assertion(instance.id).await?;
        self.publisher.publish_user(account.entity_id()).await;
        info!(assertion = %instance.entity_id, user = %account.entity_id(), "Assertion rejected from backpack");
        Ok(())
    }

    /// 导入外部徽章；已存在时改为接受并返回 DuplicateBadge
    #[instrument(skip(self, checker, source, account), fields(kind = source.kind(), user = %account.entity_id()))]
    pub async fn import(
        &self,
        checker: &dyn BadgeCheck,
        source: ImportSource,
        account: &UserAccount,
    ) -> Result<BadgeInstance> {
        let outcome = match checker.get_or_create_assertion(source, account).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_backpack_import("failed");
                return Err(e);
            }
        };

        if !outcome.created {
            let mut existing = outcome.instance;
            existing.accept();
            self.repos.assertions.update(&existing).await?;
            self.publisher.publish_user(account.entity_id()).await;
            metrics::record_backpack_import("duplicate");
            return Err(CoreError::DuplicateBadge);
        }

        metrics::record_backpack_import("created");
        self.publisher.publish_user(account.entity_id()).await;
        Ok(outcome.instance)
    }
}
