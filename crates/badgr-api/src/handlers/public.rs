//! 公开的 Open Badges 文档，无需认证
//!
//! 这些地址就是各实体的 `openBadgeId`

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use badgr_core::openbadges::RenderOptions;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// GET /public/issuers/{entity_id}
pub async fn issuer_document(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<Value>> {
    let issuer = state
        .repos
        .issuers
        .get_by_entity_id(&entity_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(state.urls.issuer_json(&issuer, RenderOptions::default())))
}

/// GET /public/badges/{entity_id}
pub async fn badge_class_document(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<Value>> {
    let badge_class = state
        .repos
        .badge_classes
        .get_by_entity_id(&entity_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let issuer = state
        .repos
        .issuers
        .get(badge_class.issuer_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let issuer_id = state.urls.issuer_jsonld_id(&issuer);
    Ok(Json(state.urls.badge_class_json(
        &badge_class,
        &issuer_id,
        RenderOptions::default(),
    )))
}

async fn assertion_document(state: &AppState, entity_id: &str) -> Result<(StatusCode, Value)> {
    let instance = state
        .repos
        .assertions
        .get_by_entity_id(entity_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if instance.revoked {
        return Ok((StatusCode::GONE, state.urls.revoked_assertion_json(&instance)));
    }

    let badge_class = state
        .repos
        .badge_classes
        .get(instance.badgeclass_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let badge_id = state.urls.badge_class_jsonld_id(&badge_class);
    Ok((
        StatusCode::OK,
        state.urls.assertion_json(&instance, &badge_id, RenderOptions::default()),
    ))
}

/// 已撤销的实例返回 410
///
/// GET /public/assertions/{entity_id}
pub async fn assertion(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Response> {
    let (status, doc) = assertion_document(&state, &entity_id).await?;
    Ok((status, Json(doc)).into_response())
}

/// 已发布的收藏集，内嵌其中仍有效的实例文档
///
/// GET /public/collections/{share_hash}
pub async fn collection(
    State(state): State<AppState>,
    Path(share_hash): Path<String>,
) -> Result<Json<Value>> {
    let collection = state
        .repos
        .collections
        .get_by_share_hash(&share_hash)
        .await?
        .ok_or(ApiError::NotFound)?;

    let mut assertions = Vec::with_capacity(collection.assertions.len());
    for entity_id in &collection.assertions {
        match assertion_document(&state, entity_id).await {
            Ok((StatusCode::OK, doc)) => assertions.push(doc),
            Ok(_) | Err(ApiError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(Json(json!({
        "id": state.urls.collection(&share_hash),
        "name": collection.name,
        "description": collection.description,
        "assertions": assertions,
    })))
}
