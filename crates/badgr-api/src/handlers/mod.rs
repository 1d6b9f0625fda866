//! API 处理器
//!
//! 每个子模块对应一组资源端点，响应统一包装为 V2 信封

pub mod assertion;
pub mod backpack;
pub mod badge_class;
pub mod collection;
pub mod health;
pub mod import;
pub mod issuer;
pub mod public;
pub mod token;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;

use badgr_core::models::{BadgeClass, BadgeInstance, Issuer};

use crate::auth::permissions::authorize_issuer;
use crate::auth::{Access, AuthContext, IssuerRule};
use crate::dto::V2Response;
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// JSON 请求体；解析失败转为 V2 错误信封
pub type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

pub type Envelope<T> = Json<V2Response<T>>;

pub type Created<T> = (StatusCode, Json<V2Response<T>>);

pub(crate) fn created<T>(item: T) -> Created<T> {
    (StatusCode::CREATED, Json(V2Response::single(item)))
}

/// 按 entity_id 加载徽章定义及其发行方，并检查发行方成员权限
pub(crate) async fn badge_class_for(
    state: &AppState,
    auth: &AuthContext,
    entity_id: &str,
    rule: IssuerRule,
    access: Access,
) -> Result<(BadgeClass, Issuer)> {
    let badge_class = state
        .repos
        .badge_classes
        .get_by_entity_id(entity_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let issuer = state
        .repos
        .issuers
        .get(badge_class.issuer_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize_issuer(&state.repos, auth, &issuer, rule, access).await?;
    Ok((badge_class, issuer))
}

/// 按 entity_id 加载徽章实例，权限按其发行方判断
pub(crate) async fn assertion_for(
    state: &AppState,
    auth: &AuthContext,
    entity_id: &str,
    rule: IssuerRule,
    access: Access,
) -> Result<BadgeInstance> {
    let instance = state
        .repos
        .assertions
        .get_by_entity_id(entity_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let issuer = state
        .repos
        .issuers
        .get(instance.issuer_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize_issuer(&state.repos, auth, &issuer, rule, access).await?;
    Ok(instance)
}
