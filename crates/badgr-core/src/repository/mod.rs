//! 数据访问层
//!
//! 服务与 HTTP 层只依赖 Trait；生产环境使用 PostgreSQL 实现，
//! 路由测试使用基于 DashMap 的内存实现（`memory` feature）。

pub mod pg;
mod traits;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

use std::sync::Arc;

use sqlx::PgPool;

pub use traits::*;

/// 分页参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    /// None 表示不限制条数
    pub limit: Option<i64>,
}

impl PageRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset: offset.max(0),
            limit: Some(limit.max(1)),
        }
    }

    /// 多取一条用于判断是否还有下一页
    pub fn lookahead(&self) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.map(|l| l + 1),
        }
    }

    /// 在内存集合上应用分页
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset).unwrap_or(0);
        let iter = items.into_iter().skip(offset);
        match self.limit.and_then(|l| usize::try_from(l).ok()) {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// 仓储集合，注入到服务与应用状态中
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepositoryTrait>,
    pub oauth: Arc<dyn OAuthRepositoryTrait>,
    pub issuers: Arc<dyn IssuerRepositoryTrait>,
    pub badge_classes: Arc<dyn BadgeClassRepositoryTrait>,
    pub assertions: Arc<dyn AssertionRepositoryTrait>,
    pub collections: Arc<dyn CollectionRepositoryTrait>,
}

impl Repositories {
    /// PostgreSQL 实现
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(pg::UserRepository::new(pool.clone())),
            oauth: Arc::new(pg::OAuthRepository::new(pool.clone())),
            issuers: Arc::new(pg::IssuerRepository::new(pool.clone())),
            badge_classes: Arc::new(pg::BadgeClassRepository::new(pool.clone())),
            assertions: Arc::new(pg::AssertionRepository::new(pool.clone())),
            collections: Arc::new(pg::CollectionRepository::new(pool)),
        }
    }

    /// 内存实现，所有仓储共享同一个存储
    #[cfg(any(test, feature = "memory"))]
    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            oauth: store.clone(),
            issuers: store.clone(),
            badge_classes: store.clone(),
            assertions: store.clone(),
            collections: store,
        }
    }
}
