//! 背包 API 处理器
//!
//! 接收者视角的徽章实例：列表、详情、接受与拒绝

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::Query;

use badgr_core::models::BadgeInstance;

use super::{Envelope, JsonBody};
use crate::auth::AuthContext;
use crate::auth::scopes::{BACKPACK_READ_SCOPES, BACKPACK_WRITE_SCOPES};
use crate::dto::{AcceptanceRequest, AssertionDto, ListQuery, Related, V2Response};
use crate::error::{ApiError, Result};
use crate::state::AppState;

async fn owned(state: &AppState, auth: &AuthContext, entity_id: &str) -> Result<BadgeInstance> {
    state
        .backpack
        .get(&auth.account, entity_id)
        .await?
        .ok_or(ApiError::NotFound)
}

/// 背包中的徽章实例，支持 `expand=badgeclass,issuer`
///
/// GET /v2/backpack/assertions
pub async fn list_backpack(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_READ_SCOPES)?;

    let instances = state.backpack.list(&auth.account).await?;
    let result = Related::new(&state)
        .backpack_assertions(instances, query.expands())
        .await?;
    Ok(Json(V2Response::ok(result)))
}

/// GET /v2/backpack/assertions/{entity_id}
pub async fn get_backpack_assertion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_READ_SCOPES)?;

    let instance = owned(&state, &auth, &entity_id).await?;
    let dto = Related::new(&state)
        .backpack_assertion(instance, query.expands())
        .await?;
    Ok(Json(V2Response::single(dto)))
}

/// 接受徽章实例
///
/// PUT /v2/backpack/assertions/{entity_id}
pub async fn update_acceptance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<AcceptanceRequest>,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_WRITE_SCOPES)?;
    let instance = owned(&state, &auth, &entity_id).await?;
    let Json(req) = payload?;
    req.validated().map_err(ApiError::FieldErrors)?;

    let instance = state
        .backpack
        .accept(instance, Some(auth.account.entity_id()))
        .await?;
    let dto = Related::new(&state)
        .backpack_assertion(instance, Default::default())
        .await?;
    Ok(Json(V2Response::single(dto)))
}

/// 拒绝徽章实例并从所有收藏集中移除
///
/// DELETE /v2/backpack/assertions/{entity_id}
pub async fn reject_assertion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<StatusCode> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_WRITE_SCOPES)?;
    let instance = owned(&state, &auth, &entity_id).await?;

    state.backpack.reject(&auth.account, instance).await?;
    Ok(StatusCode::NO_CONTENT)
}
