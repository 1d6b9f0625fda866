//! 发行方 API 处理器
//!
//! 发行方的列表、创建、详情、整体更新与删除

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use validator::Validate;

use badgr_core::CoreError;
use badgr_core::models::Issuer;

use super::{Created, Envelope, JsonBody, created};
use crate::auth::permissions::issuer_for;
use crate::auth::scopes::RW_ISSUER;
use crate::auth::{Access, AuthContext, IssuerRule};
use crate::dto::{IssuerDto, IssuerRequest, V2Response};
use crate::error::{ApiError, Result};
use crate::state::AppState;

const UNVERIFIED_ISSUER_EMAIL: &str =
    "Issuer email must be one of your verified addresses. Add this email to your profile and try again.";

async fn to_dto(state: &AppState, issuer: Issuer) -> Result<IssuerDto> {
    let staff = state.repos.issuers.list_staff(issuer.id).await?;
    Ok(IssuerDto::new(issuer, &staff, &state.urls))
}

/// 当前用户所属的发行方
///
/// GET /v2/issuers
pub async fn list_issuers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Envelope<IssuerDto>> {
    auth.require_verified()?;
    auth.require_scope(&[RW_ISSUER])?;

    let issuers = state.repos.issuers.list_for_user(auth.user_id()).await?;
    let mut result = Vec::with_capacity(issuers.len());
    for issuer in issuers {
        result.push(to_dto(&state, issuer).await?);
    }
    Ok(Json(V2Response::ok(result)))
}

/// 创建发行方，创建者成为 owner
///
/// POST /v2/issuers
pub async fn create_issuer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: JsonBody<IssuerRequest>,
) -> Result<Created<IssuerDto>> {
    auth.require_verified()?;
    auth.require_scope(&[RW_ISSUER])?;
    let Json(req) = payload?;
    req.validate()?;

    let email = req.email.as_deref().unwrap_or_default();
    if !auth.account.is_email_verified(email) {
        return Err(ApiError::validation(UNVERIFIED_ISSUER_EMAIL));
    }

    let issuer = state
        .repos
        .issuers
        .create(req.into_new_issuer(auth.user_id()), Some(auth.user_id()))
        .await?;
    info!(
        event = "IssuerCreated",
        issuer = %issuer.entity_id,
        user = %auth.account.entity_id(),
        "Issuer created"
    );

    Ok(created(to_dto(&state, issuer).await?))
}

/// 获取发行方详情
///
/// GET /v2/issuers/{entity_id}
pub async fn get_issuer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<IssuerDto>> {
    auth.require_verified()?;
    let issuer = issuer_for(&state.repos, &auth, &entity_id, IssuerRule::Editor, Access::Read).await?;
    Ok(Json(V2Response::single(to_dto(&state, issuer).await?)))
}

/// 整体更新发行方
///
/// PUT /v2/issuers/{entity_id}
pub async fn update_issuer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<IssuerRequest>,
) -> Result<Envelope<IssuerDto>> {
    auth.require_verified()?;
    let mut issuer =
        issuer_for(&state.repos, &auth, &entity_id, IssuerRule::Editor, Access::Write).await?;
    let Json(req) = payload?;
    req.validate()?;

    req.apply_to(&mut issuer);
    let issuer = state.repos.issuers.update(&issuer).await?;
    info!(issuer = %issuer.entity_id, user = %auth.account.entity_id(), "Issuer updated");

    Ok(Json(V2Response::single(to_dto(&state, issuer).await?)))
}

/// 删除发行方；已发放过徽章的发行方不可删除
///
/// DELETE /v2/issuers/{entity_id}
pub async fn delete_issuer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<IssuerDto>> {
    auth.require_verified()?;
    let issuer =
        issuer_for(&state.repos, &auth, &entity_id, IssuerRule::Editor, Access::Write).await?;

    if state.repos.assertions.count_for_issuer(issuer.id).await? > 0 {
        return Err(CoreError::IssuerHasAssertions.into());
    }
    state.repos.issuers.delete(issuer.id).await?;
    info!(issuer = %issuer.entity_id, user = %auth.account.entity_id(), "Issuer deleted");

    Ok(Json(V2Response::empty()))
}
