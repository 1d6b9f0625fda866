//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理、JSON 值读写以及发布通知的封装。

use crate::config::RedisConfig;
use crate::error::{BadgrError, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{info, instrument};

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(BadgrError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(BadgrError::from)
    }

    /// 获取值
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// 设置值
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)?;

        let _: () = conn.set_ex(key, serialized, ttl.as_secs()).await?;
        Ok(())
    }

    /// 删除值
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// 获取或设置（缓存未命中时调用 loader 并回填）
    #[instrument(skip(self, loader))]
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<BadgrError>,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(cached);
        }

        let value = loader().await?;
        self.set(key, &value, ttl).await?;

        Ok(value)
    }

    /// 向频道发布消息，返回收到消息的订阅者数量
    #[instrument(skip(self, message))]
    pub async fn publish(&self, channel: &str, message: &str) -> Result<i64> {
        let mut conn = self.get_conn().await?;
        let receivers: i64 = conn.publish(channel, message).await?;
        Ok(receivers)
    }
}

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    /// 用户背包中的徽章实例列表
    pub fn backpack_assertions(user_entity_id: &str) -> String {
        format!("backpack:assertions:{}", user_entity_id)
    }

    /// 用户变更通知频道
    pub fn user_channel(user_entity_id: &str) -> String {
        format!("badgr:user:{}", user_entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_generation() {
        assert_eq!(
            CacheKey::backpack_assertions("u1"),
            "backpack:assertions:u1"
        );
        assert_eq!(CacheKey::user_channel("u1"), "badgr:user:u1");
    }

    #[tokio::test]
    #[ignore] // 需要 Redis
    async fn test_set_get_delete_roundtrip() {
        let cache = Cache::new(&RedisConfig::default()).unwrap();
        cache
            .set("badgr:test:key", &vec![1, 2, 3], Duration::from_secs(5))
            .await
            .unwrap();
        let value: Option<Vec<i32>> = cache.get("badgr:test:key").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        cache.delete("badgr:test:key").await.unwrap();
        let value: Option<Vec<i32>> = cache.get("badgr:test:key").await.unwrap();
        assert!(value.is_none());
    }
}
