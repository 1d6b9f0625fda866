//! 背包收藏集 API 处理器

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use validator::Validate;

use badgr_core::FieldErrors;
use badgr_core::entity_id;
use badgr_core::models::{BackpackCollection, NewCollection};
use badgr_core::text::strip_tags;

use super::{Created, Envelope, JsonBody, created};
use crate::auth::AuthContext;
use crate::auth::scopes::{BACKPACK_READ_SCOPES, BACKPACK_WRITE_SCOPES};
use crate::dto::{CollectionDto, CollectionRequest, V2Response};
use crate::error::{ApiError, Result};
use crate::state::AppState;

fn to_dto(state: &AppState, auth: &AuthContext, collection: BackpackCollection) -> CollectionDto {
    CollectionDto::new(collection, auth.account.entity_id(), state.urls.origin())
}

/// 收藏集中的实例必须是请求者背包中的实例
async fn checked_assertions(state: &AppState, auth: &AuthContext, ids: Vec<String>) -> Result<Vec<String>> {
    let mut errors = FieldErrors::new();
    for id in &ids {
        if state.backpack.get(&auth.account, id).await?.is_none() {
            errors.add("assertions", format!("Invalid assertion {}", id));
        }
    }
    if errors.is_empty() {
        Ok(ids)
    } else {
        Err(ApiError::FieldErrors(errors))
    }
}

async fn owned(state: &AppState, auth: &AuthContext, entity_id: &str) -> Result<BackpackCollection> {
    state
        .repos
        .collections
        .get_by_entity_id(entity_id)
        .await?
        .filter(|c| c.owner_id == auth.user_id())
        .ok_or(ApiError::NotFound)
}

/// GET /v2/backpack/collections
pub async fn list_collections(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Envelope<CollectionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_READ_SCOPES)?;

    let collections = state.repos.collections.list_for_owner(auth.user_id()).await?;
    let result = collections
        .into_iter()
        .map(|c| to_dto(&state, &auth, c))
        .collect();
    Ok(Json(V2Response::ok(result)))
}

/// 创建收藏集，`published` 为真时生成分享地址
///
/// POST /v2/backpack/collections
pub async fn create_collection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: JsonBody<CollectionRequest>,
) -> Result<Created<CollectionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_WRITE_SCOPES)?;
    let Json(req) = payload?;
    req.validate()?;

    let assertions = checked_assertions(&state, &auth, req.assertions.unwrap_or_default()).await?;
    let collection = state
        .repos
        .collections
        .create(NewCollection {
            entity_id: entity_id::generate(),
            owner_id: auth.user_id(),
            name: strip_tags(req.name.as_deref().unwrap_or_default()),
            description: req.description.as_deref().map(strip_tags).unwrap_or_default(),
            share_hash: req.published.unwrap_or(false).then(entity_id::generate),
            assertions,
        })
        .await?;
    info!(collection = %collection.entity_id, user = %auth.account.entity_id(), "Collection created");

    Ok(created(to_dto(&state, &auth, collection)))
}

/// GET /v2/backpack/collections/{entity_id}
pub async fn get_collection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<CollectionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_READ_SCOPES)?;

    let collection = owned(&state, &auth, &entity_id).await?;
    Ok(Json(V2Response::single(to_dto(&state, &auth, collection))))
}

/// 更新收藏集；未提供 `assertions` 时保持原有内容
///
/// PUT /v2/backpack/collections/{entity_id}
pub async fn update_collection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<CollectionRequest>,
) -> Result<Envelope<CollectionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_WRITE_SCOPES)?;
    let mut collection = owned(&state, &auth, &entity_id).await?;
    let Json(req) = payload?;
    req.validate()?;

    if let Some(ids) = req.assertions {
        collection.assertions = checked_assertions(&state, &auth, ids).await?;
    }
    collection.name = strip_tags(req.name.as_deref().unwrap_or_default());
    if let Some(description) = req.description.as_deref() {
        collection.description = strip_tags(description);
    }
    if let Some(published) = req.published {
        collection.set_published(published);
    }
    let collection = state.repos.collections.update(&collection).await?;

    Ok(Json(V2Response::single(to_dto(&state, &auth, collection))))
}

/// DELETE /v2/backpack/collections/{entity_id}
pub async fn delete_collection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<CollectionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_WRITE_SCOPES)?;
    let collection = owned(&state, &auth, &entity_id).await?;

    state.repos.collections.delete(collection.id).await?;
    info!(collection = %collection.entity_id, user = %auth.account.entity_id(), "Collection deleted");
    Ok(Json(V2Response::empty()))
}
