//! Open Badges 发行与背包 API 服务

use std::sync::Arc;
use std::time::Duration;

use axum::{http::HeaderValue, middleware};
use badgr_api::{routes, state::AppState};
use badgr_core::badgecheck::{BadgeCheckService, HttpFetcher};
use badgr_core::publisher::{NoopPublisher, RedisUserPublisher, UserPublisher};
use badgr_core::repository::Repositories;
use badgr_shared::{
    cache::Cache,
    config::AppConfig,
    database::Database,
    observability::{self, middleware as obs_middleware},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("badgr-api").unwrap_or_default();

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting badgr-api on {}", config.server_addr());

    let db = Database::connect(&config.database).await?;
    db.run_migrations().await?;

    // Redis 不可用时背包不走缓存，发布退化为空操作
    let cache = match Cache::new(&config.redis) {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            warn!(error = %e, "Redis 初始化失败，背包缓存不可用");
            None
        }
    };
    let publisher: Arc<dyn UserPublisher> = match &cache {
        Some(cache) => Arc::new(RedisUserPublisher::new(cache.clone())),
        None => Arc::new(NoopPublisher),
    };

    let repos = Repositories::postgres(db.pool().clone());
    let fetcher = HttpFetcher::new(
        Duration::from_secs(config.app.badge_check_timeout_seconds),
        config.app.badge_check_max_bytes,
    )?;
    let badge_check = Arc::new(BadgeCheckService::new(repos.clone(), Arc::new(fetcher)));

    let state = AppState::new(repos, config.app.clone(), publisher, badge_check, cache)
        .with_database(db.clone());

    let cors = if config.server.cors_origins.trim() == "*" {
        if config.is_production() {
            warn!("cors_origins=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS allowed_origins: {}", config.server.cors_origins);
        let origins: Vec<_> = config
            .server
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = routes::build_router(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_seconds,
        )))
        .layer(cors)
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// 收到 SIGTERM 或 Ctrl+C 后返回，触发 axum 的优雅关闭流程
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
