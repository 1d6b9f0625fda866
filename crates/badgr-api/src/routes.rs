//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{handlers, middleware::bearer_auth, state::AppState};

/// 健康检查路由（公开）
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
}

/// OAuth 令牌端点（公开）
fn oauth_routes() -> Router<AppState> {
    Router::new().route("/o/token", post(handlers::token::token))
}

/// 公开的 Open Badges 文档
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/public/issuers/{entity_id}", get(handlers::public::issuer_document))
        .route("/public/badges/{entity_id}", get(handlers::public::badge_class_document))
        .route("/public/assertions/{entity_id}", get(handlers::public::assertion))
        .route("/public/collections/{share_hash}", get(handlers::public::collection))
}

/// 发行方、徽章定义与徽章实例
fn issuer_routes() -> Router<AppState> {
    Router::new()
        // 发行方
        .route(
            "/v2/issuers",
            get(handlers::issuer::list_issuers).post(handlers::issuer::create_issuer),
        )
        .route(
            "/v2/issuers/{entity_id}",
            get(handlers::issuer::get_issuer)
                .put(handlers::issuer::update_issuer)
                .delete(handlers::issuer::delete_issuer),
        )
        .route(
            "/v2/issuers/{entity_id}/badgeclasses",
            get(handlers::badge_class::list_issuer_badge_classes)
                .post(handlers::badge_class::create_issuer_badge_class),
        )
        .route(
            "/v2/issuers/{entity_id}/assertions",
            get(handlers::assertion::list_issuer_assertions)
                .post(handlers::assertion::issue_issuer_assertion),
        )
        // 徽章定义
        .route(
            "/v2/badgeclasses",
            get(handlers::badge_class::list_all_badge_classes)
                .post(handlers::badge_class::create_badge_class),
        )
        .route(
            "/v2/badgeclasses/{entity_id}",
            get(handlers::badge_class::get_badge_class)
                .put(handlers::badge_class::update_badge_class)
                .delete(handlers::badge_class::delete_badge_class),
        )
        .route(
            "/v2/badgeclasses/{entity_id}/assertions",
            get(handlers::assertion::list_badge_class_assertions)
                .post(handlers::assertion::issue_badge_class_assertion),
        )
        .route(
            "/v2/badgeclasses/{entity_id}/issue",
            post(handlers::assertion::batch_issue),
        )
        // 徽章实例
        .route("/v2/assertions/revoke", post(handlers::assertion::batch_revoke))
        .route("/v2/assertions/changed", get(handlers::assertion::changed_since))
        .route(
            "/v2/assertions/{entity_id}",
            get(handlers::assertion::get_assertion)
                .put(handlers::assertion::update_assertion)
                .delete(handlers::assertion::revoke_assertion),
        )
        .route("/v2/issuer-tokens", post(handlers::token::issuer_tokens))
}

/// 背包与收藏集
fn backpack_routes() -> Router<AppState> {
    Router::new()
        .route("/v2/backpack/assertions", get(handlers::backpack::list_backpack))
        .route(
            "/v2/backpack/assertions/{entity_id}",
            get(handlers::backpack::get_backpack_assertion)
                .put(handlers::backpack::update_acceptance)
                .delete(handlers::backpack::reject_assertion),
        )
        .route(
            "/v2/backpack/collections",
            get(handlers::collection::list_collections)
                .post(handlers::collection::create_collection),
        )
        .route(
            "/v2/backpack/collections/{entity_id}",
            get(handlers::collection::get_collection)
                .put(handlers::collection::update_collection)
                .delete(handlers::collection::delete_collection),
        )
        .route("/v2/backpack/import", post(handlers::import::import_badge))
}

/// 构建完整路由；`/v2` 下的端点需要 Bearer 令牌
pub fn build_router(state: AppState) -> Router {
    let v2 = issuer_routes()
        .merge(backpack_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), bearer_auth));

    Router::new()
        .merge(health_routes())
        .merge(oauth_routes())
        .merge(public_routes())
        .merge(v2)
        .with_state(state)
}
