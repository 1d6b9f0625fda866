//! 用户缓存发布
//!
//! 徽章实例被接受、拒绝或导入后，需要让该用户的背包缓存失效，
//! 并在 Redis 频道上广播一次变更，供其他实例或推送服务订阅。

use std::sync::Arc;

use async_trait::async_trait;
use badgr_shared::cache::{Cache, CacheKey};
use tracing::{debug, warn};

/// 用户变更发布接口；失败只记录日志，不影响主流程
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserPublisher: Send + Sync {
    async fn publish_user(&self, user_entity_id: &str);
}

/// 基于 Redis 的发布实现
pub struct RedisUserPublisher {
    cache: Arc<Cache>,
}

impl RedisUserPublisher {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl UserPublisher for RedisUserPublisher {
    async fn publish_user(&self, user_entity_id: &str) {
        let key = CacheKey::backpack_assertions(user_entity_id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key = %key, error = %e, "背包缓存失效失败");
        }

        let channel = CacheKey::user_channel(user_entity_id);
        match self.cache.publish(&channel, "updated").await {
            Ok(receivers) => debug!(channel = %channel, receivers, "用户变更已发布"),
            Err(e) => warn!(channel = %channel, error = %e, "用户变更发布失败"),
        }
    }
}

/// Redis 关闭时使用
pub struct NoopPublisher;

#[async_trait]
impl UserPublisher for NoopPublisher {
    async fn publish_user(&self, user_entity_id: &str) {
        debug!(user = %user_entity_id, "Redis 未启用，跳过用户变更发布");
    }
}

/// 记录每次发布的用户，供路由测试断言发布次数
#[cfg(any(test, feature = "memory"))]
#[derive(Default)]
pub struct RecordingPublisher {
    published: std::sync::Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "memory"))]
impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn count_for(&self, user_entity_id: &str) -> usize {
        self.published()
            .iter()
            .filter(|p| p.as_str() == user_entity_id)
            .count()
    }
}

#[cfg(any(test, feature = "memory"))]
#[async_trait]
impl UserPublisher for RecordingPublisher {
    async fn publish_user(&self, user_entity_id: &str) {
        if let Ok(mut published) = self.published.lock() {
            published.push(user_entity_id.to_string());
        }
    }
}
