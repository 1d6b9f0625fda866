//! 徽章定义 API 处理器

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use badgr_core::CoreError;
use badgr_core::models::{BadgeClass, Issuer};

use super::{Created, Envelope, JsonBody, badge_class_for, created};
use crate::auth::permissions::issuer_for;
use crate::auth::scopes::RW_ISSUER;
use crate::auth::{Access, AuthContext, IssuerRule};
use crate::dto::{BadgeClassDto, BadgeClassRequest, Related, V2Response};
use crate::error::{ApiError, Result};
use crate::state::AppState;

async fn create_in(
    state: &AppState,
    auth: &AuthContext,
    issuer: &Issuer,
    req: BadgeClassRequest,
) -> Result<BadgeClass> {
    let fields = req.validated().map_err(ApiError::FieldErrors)?;
    let badge_class = state
        .repos
        .badge_classes
        .create(fields.into_new(issuer.id, auth.user_id()))
        .await?;
    info!(
        event = "BadgeClassCreated",
        badgeclass = %badge_class.entity_id,
        issuer = %issuer.entity_id,
        user = %auth.account.entity_id(),
        "Badge class created"
    );
    Ok(badge_class)
}

/// 当前用户所属发行方下的全部徽章定义
///
/// GET /v2/badgeclasses
pub async fn list_all_badge_classes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Envelope<BadgeClassDto>> {
    auth.require_verified()?;
    auth.require_scope(&[RW_ISSUER])?;

    let badge_classes = state.repos.badge_classes.list_for_user(auth.user_id()).await?;
    let result = Related::new(&state).badge_class_dtos(badge_classes).await?;
    Ok(Json(V2Response::ok(result)))
}

/// 在请求体 `issuer` 指定的发行方下创建徽章定义
///
/// POST /v2/badgeclasses
pub async fn create_badge_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: JsonBody<BadgeClassRequest>,
) -> Result<Created<BadgeClassDto>> {
    auth.require_verified()?;
    auth.require_scope(&[RW_ISSUER])?;
    let Json(req) = payload?;

    let issuer_id = req
        .issuer
        .clone()
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| ApiError::field("issuer", "This field is required"))?;
    let issuer = issuer_for(&state.repos, &auth, &issuer_id, IssuerRule::Editor, Access::Write).await?;

    let badge_class = create_in(&state, &auth, &issuer, req).await?;
    Ok(created(Related::new(&state).badge_class_dto(badge_class).await?))
}

/// 发行方下的徽章定义
///
/// GET /v2/issuers/{entity_id}/badgeclasses
pub async fn list_issuer_badge_classes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<BadgeClassDto>> {
    auth.require_verified()?;
    let issuer = issuer_for(&state.repos, &auth, &entity_id, IssuerRule::Editor, Access::Read).await?;

    let badge_classes = state.repos.badge_classes.list_for_issuer(issuer.id).await?;
    let result = Related::new(&state).badge_class_dtos(badge_classes).await?;
    Ok(Json(V2Response::ok(result)))
}

/// 在路径指定的发行方下创建徽章定义，请求体中的 `issuer` 被忽略
///
/// POST /v2/issuers/{entity_id}/badgeclasses
pub async fn create_issuer_badge_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<BadgeClassRequest>,
) -> Result<Created<BadgeClassDto>> {
    auth.require_verified()?;
    let issuer = issuer_for(&state.repos, &auth, &entity_id, IssuerRule::Editor, Access::Write).await?;
    let Json(req) = payload?;

    let badge_class = create_in(&state, &auth, &issuer, req).await?;
    Ok(created(Related::new(&state).badge_class_dto(badge_class).await?))
}

/// 获取徽章定义详情
///
/// GET /v2/badgeclasses/{entity_id}
pub async fn get_badge_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<BadgeClassDto>> {
    auth.require_verified()?;
    let (badge_class, _) =
        badge_class_for(&state, &auth, &entity_id, IssuerRule::Editor, Access::Read).await?;
    Ok(Json(V2Response::single(
        Related::new(&state).badge_class_dto(badge_class).await?,
    )))
}

/// 整体更新徽章定义；已发放的实例不受影响
///
/// PUT /v2/badgeclasses/{entity_id}
pub async fn update_badge_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<BadgeClassRequest>,
) -> Result<Envelope<BadgeClassDto>> {
    auth.require_verified()?;
    let (mut badge_class, _) =
        badge_class_for(&state, &auth, &entity_id, IssuerRule::Editor, Access::Write).await?;
    let Json(req) = payload?;

    let fields = req.validated().map_err(ApiError::FieldErrors)?;
    fields.apply_to(&mut badge_class);
    let badge_class = state.repos.badge_classes.update(&badge_class).await?;
    info!(badgeclass = %badge_class.entity_id, user = %auth.account.entity_id(), "Badge class updated");

    Ok(Json(V2Response::single(
        Related::new(&state).badge_class_dto(badge_class).await?,
    )))
}

/// 删除徽章定义；已有发放记录时拒绝
///
/// DELETE /v2/badgeclasses/{entity_id}
pub async fn delete_badge_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<BadgeClassDto>> {
    auth.require_verified()?;
    let (badge_class, _) =
        badge_class_for(&state, &auth, &entity_id, IssuerRule::Editor, Access::Write).await?;

    if state.repos.assertions.count_for_badgeclass(badge_class.id).await? > 0 {
        return Err(CoreError::BadgeClassAlreadyIssued.into());
    }
    state.repos.badge_classes.delete(badge_class.id).await?;
    info!(badgeclass = %badge_class.entity_id, user = %auth.account.entity_id(), "Badge class deleted");

    Ok(Json(V2Response::empty()))
}
