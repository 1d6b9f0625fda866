//! 背包导入处理器

use axum::{
    Extension, Json,
    extract::State,
};

use super::{Created, JsonBody, created};
use crate::auth::AuthContext;
use crate::auth::scopes::BACKPACK_WRITE_SCOPES;
use crate::dto::{AssertionDto, Expands, ImportRequest, Related};
use crate::error::Result;
use crate::state::AppState;

/// 从 URL、烘焙图片或内联 assertion 导入外部徽章；
/// 已存在时重新接受并返回 DUPLICATE_BADGE 错误
///
/// POST /v2/backpack/import
pub async fn import_badge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: JsonBody<ImportRequest>,
) -> Result<Created<AssertionDto>> {
    auth.require_verified()?;
    auth.require_scope(BACKPACK_WRITE_SCOPES)?;
    let Json(req) = payload?;

    let source = req.into_source()?;
    let instance = state
        .backpack
        .import(state.badge_check.as_ref(), source, &auth.account)
        .await?;

    let dto = Related::new(&state)
        .backpack_assertion(instance, Expands::default())
        .await?;
    Ok(created(dto))
}
