//! 健康检查端点

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

const SERVICE_NAME: &str = "badgr-api";

/// 存活检查
///
/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪检查：检查数据库和 Redis 连接；未配置的依赖视为可用
///
/// GET /ready
pub async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    let database = async {
        match &state.database {
            Some(db) => db.health_check().await.is_ok(),
            None => true,
        }
    };
    let redis = async {
        match &state.cache {
            Some(cache) => cache.health_check().await.is_ok(),
            None => true,
        }
    };
    let (db_ok, cache_ok) = futures::join!(database, redis);

    Json(json!({
        "status": if db_ok && cache_ok { "ok" } else { "degraded" },
        "service": SERVICE_NAME,
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "redis": if cache_ok { "ok" } else { "fail" }
        }
    }))
}
