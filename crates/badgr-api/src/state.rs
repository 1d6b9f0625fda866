//! 应用状态定义
//!
//! 包含 Axum 路由共享的仓储、领域服务与基础设施句柄

use std::sync::Arc;
use std::time::Duration;

use badgr_core::badgecheck::BadgeCheck;
use badgr_core::openbadges::OpenBadgesUrls;
use badgr_core::publisher::UserPublisher;
use badgr_core::repository::Repositories;
use badgr_core::service::{BackpackService, IssuanceService, RevocationService, TokenService};
use badgr_shared::cache::Cache;
use badgr_shared::config::BadgrSettings;
use badgr_shared::database::Database;

/// Axum 应用共享状态
///
/// 服务只依赖仓储 Trait，路由测试可以注入内存仓储
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub settings: Arc<BadgrSettings>,
    pub urls: OpenBadgesUrls,
    pub issuance: Arc<IssuanceService>,
    pub revocation: Arc<RevocationService>,
    pub tokens: Arc<TokenService>,
    pub backpack: Arc<BackpackService>,
    pub badge_check: Arc<dyn BadgeCheck>,
    /// 就绪检查使用；内存仓储下为 None
    pub database: Option<Database>,
    pub cache: Option<Arc<Cache>>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        settings: BadgrSettings,
        publisher: Arc<dyn UserPublisher>,
        badge_check: Arc<dyn BadgeCheck>,
        cache: Option<Arc<Cache>>,
    ) -> Self {
        let urls = OpenBadgesUrls::new(&settings.public_origin);
        let issuance = IssuanceService::new(repos.clone(), urls.clone());
        let revocation = RevocationService::new(repos.clone(), publisher.clone());
        let tokens = TokenService::new(
            repos.clone(),
            settings.access_token_expire_seconds,
            settings.issuer_token_lifetime_weeks,
        );
        let backpack = BackpackService::new(
            repos.clone(),
            publisher,
            cache.clone(),
            Duration::from_secs(settings.backpack_cache_ttl_seconds),
        );

        Self {
            repos,
            settings: Arc::new(settings),
            urls,
            issuance: Arc::new(issuance),
            revocation: Arc::new(revocation),
            tokens: Arc::new(tokens),
            backpack: Arc::new(backpack),
            badge_check,
            database: None,
            cache,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// 变更流等分页接口的每页条数：未指定时取默认值，且不超过上限
    pub fn page_size(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.settings.default_page_size)
            .clamp(1, self.settings.max_page_size.max(1))
    }
}
