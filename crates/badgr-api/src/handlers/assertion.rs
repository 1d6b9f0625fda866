//! 徽章实例 API 处理器
//!
//! 单个与批量发放、列表、详情、更新、撤销以及变更流

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::{StatusCode, Uri},
};
use axum_extra::extract::Query;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use badgr_core::models::{AssertionFilter, BadgeClass, BadgeInstance};
use badgr_core::openbadges::format_timestamp;
use badgr_core::repository::PageRequest;
use badgr_core::service::AssertionDraft;
use badgr_core::{CoreError, FieldErrors};

use super::{Created, Envelope, JsonBody, assertion_for, badge_class_for, created};
use crate::auth::permissions::issuer_for;
use crate::auth::scopes::R_ASSERTIONS;
use crate::auth::{Access, AuthContext, IssuerRule};
use crate::dto::{
    AssertionDto, AssertionRequest, BatchIssueRequest, ChangedSinceQuery, ListQuery, Paginator,
    Related, RevokeResult, V2Response, parse_num,
};
use crate::dto::query::parse_since;
use crate::error::{ApiError, Result};
use crate::state::AppState;

const NON_FIELD_ERRORS: &str = "non_field_errors";
const PERMISSION_DENIED: &str = "permission denied or object not found";

/// 带 `num` 时分页，否则返回全部
async fn list_page(
    state: &AppState,
    filter: AssertionFilter,
    query: &ListQuery,
    uri: &Uri,
) -> Result<Envelope<AssertionDto>> {
    let now = Utc::now();
    let Some(num) = parse_num(query.num.as_deref())? else {
        let instances = state.repos.assertions.list(&filter, now, PageRequest::all()).await?;
        let result = Related::new(state).assertions(instances).await?;
        return Ok(Json(V2Response::ok(result)));
    };

    let paginator = Paginator::new(state.page_size(Some(num)), query.cursor.as_deref())?;
    let instances = state.repos.assertions.list(&filter, now, paginator.page_request()).await?;
    let (instances, pagination) = paginator.finish(instances, state.urls.origin(), uri);
    let result = Related::new(state).assertions(instances).await?;
    Ok(Json(V2Response::ok(result).with_pagination(Some(pagination))))
}

fn into_draft(req: AssertionRequest) -> Result<AssertionDraft> {
    req.into_draft().map_err(ApiError::FieldErrors)
}

/// 徽章定义下的未撤销实例，可按 `recipient` 过滤
///
/// GET /v2/badgeclasses/{entity_id}/assertions
pub async fn list_badge_class_assertions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    Query(query): Query<ListQuery>,
    OriginalUri(uri): OriginalUri,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    let (badge_class, _) =
        badge_class_for(&state, &auth, &entity_id, IssuerRule::Staff, Access::Read).await?;

    let filter = AssertionFilter::for_badgeclass(badge_class.id).with_recipients(query.recipient.clone());
    list_page(&state, filter, &query, &uri).await
}

/// 发放单个徽章实例
///
/// POST /v2/badgeclasses/{entity_id}/assertions
pub async fn issue_badge_class_assertion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<AssertionRequest>,
) -> Result<Created<AssertionDto>> {
    auth.require_verified()?;
    let (badge_class, _) =
        badge_class_for(&state, &auth, &entity_id, IssuerRule::Staff, Access::Write).await?;
    let Json(req) = payload?;

    let draft = into_draft(req)?;
    let instance = state
        .issuance
        .issue(&badge_class, None, draft, Some(auth.user_id()))
        .await?;
    Ok(created(Related::new(&state).assertion(instance).await?))
}

/// 发行方下的实例；默认排除已过期与已撤销
///
/// GET /v2/issuers/{entity_id}/assertions
pub async fn list_issuer_assertions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    Query(query): Query<ListQuery>,
    OriginalUri(uri): OriginalUri,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    let issuer = issuer_for(&state.repos, &auth, &entity_id, IssuerRule::Staff, Access::Read).await?;

    let mut filter = AssertionFilter::for_issuer(issuer.id).with_recipients(query.recipient.clone());
    filter.include_expired = query.include_expired();
    filter.include_revoked = query.include_revoked();
    list_page(&state, filter, &query, &uri).await
}

/// 在发行方下发放，徽章定义由请求体指定
///
/// POST /v2/issuers/{entity_id}/assertions
pub async fn issue_issuer_assertion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<AssertionRequest>,
) -> Result<Created<AssertionDto>> {
    auth.require_verified()?;
    let issuer = issuer_for(&state.repos, &auth, &entity_id, IssuerRule::Staff, Access::Write).await?;
    let Json(req) = payload?;

    let reference = req
        .badge_class_ref()
        .ok_or_else(|| ApiError::field("badgeclass", "This field is required"))?;
    let draft = into_draft(req)?;
    let badge_class = state.issuance.resolve_badge_class(reference, Some(&issuer)).await?;
    let instance = state
        .issuance
        .issue(&badge_class, Some(&issuer), draft, Some(auth.user_id()))
        .await?;
    Ok(created(Related::new(&state).assertion(instance).await?))
}

/// 批量发放同一徽章定义；任一条目校验失败时整体不写入，
/// 返回与条目顺序对应的字段错误列表
///
/// POST /v2/badgeclasses/{entity_id}/issue
pub async fn batch_issue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<BatchIssueRequest>,
) -> Result<(StatusCode, Envelope<AssertionDto>)> {
    auth.require_verified()?;
    let (badge_class, _) =
        badge_class_for(&state, &auth, &entity_id, IssuerRule::Staff, Access::Write).await?;
    let Json(req) = payload?;
    let items = req
        .assertions
        .ok_or_else(|| ApiError::field("assertions", "This field is required"))?;

    let mut drafts = Vec::with_capacity(items.len());
    let mut item_errors = Vec::with_capacity(items.len());
    for mut item in items {
        if let Some(object) = item.as_object_mut() {
            object.insert("create_notification".to_string(), Value::Bool(req.create_notification));
        }
        match batch_item(&state, &badge_class, item).await? {
            Ok(draft) => {
                drafts.push(draft);
                item_errors.push(FieldErrors::new());
            }
            Err(errors) => item_errors.push(errors),
        }
    }

    if item_errors.iter().any(|e| !e.is_empty()) {
        return Err(ApiError::ItemFieldErrors(item_errors));
    }

    let instances = state
        .issuance
        .issue_batch(&badge_class, drafts, Some(auth.user_id()))
        .await?;
    let result = Related::new(&state).assertions(instances).await?;
    Ok((StatusCode::CREATED, Json(V2Response::ok(result))))
}

/// 单个条目的校验；外层 Err 为系统错误
async fn batch_item(
    state: &AppState,
    badge_class: &BadgeClass,
    item: Value,
) -> Result<std::result::Result<AssertionDraft, FieldErrors>> {
    let req: AssertionRequest = match serde_json::from_value(item) {
        Ok(req) => req,
        Err(e) => return Ok(Err(FieldErrors::single(NON_FIELD_ERRORS, e.to_string()))),
    };
    let draft = match req.into_draft() {
        Ok(draft) => draft,
        Err(errors) => return Ok(Err(errors)),
    };
    match state.issuance.check_award(badge_class, None, &draft).await {
        Ok(()) => Ok(Ok(draft)),
        Err(CoreError::FieldErrors(errors)) => Ok(Err(errors)),
        Err(CoreError::Validation(message)) => Ok(Err(FieldErrors::single(NON_FIELD_ERRORS, message))),
        Err(e) => Err(e.into()),
    }
}

/// 批量撤销，逐条返回结果；单条失败不影响其他条目
///
/// POST /v2/assertions/revoke
pub async fn batch_revoke(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: JsonBody<Vec<Value>>,
) -> Result<Envelope<RevokeResult>> {
    auth.require_verified()?;
    let Json(items) = payload?;

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        results.push(revoke_one(&state, &auth, item).await?);
    }
    Ok(Json(V2Response::ok(results).with_description("revoked badges")))
}

async fn revoke_one(state: &AppState, auth: &AuthContext, item: Value) -> Result<RevokeResult> {
    let mut result = RevokeResult::default();

    // 逐字段读取，类型不符的字段视为缺失
    let Some(entity_id) = string_field(&item, "entityId") else {
        return Ok(result.failed("entityId is required"));
    };
    result.entity_id = Some(entity_id.clone());
    let Some(reason) = string_field(&item, "revocationReason") else {
        return Ok(result.failed("revocationReason is required"));
    };
    result.revocation_reason = Some(reason.clone());

    let instance = match assertion_for(state, auth, &entity_id, IssuerRule::Editor, Access::Write).await {
        Ok(instance) => instance,
        Err(ApiError::NotFound) => return Ok(result.failed(PERMISSION_DENIED)),
        Err(e) => return Err(e),
    };

    match state.revocation.revoke(instance, &reason).await {
        Ok(_) => {
            result.revoked = true;
            Ok(result)
        }
        Err(e) if e.is_system_error() => Err(e.into()),
        Err(e) => Ok(result.failed(e.to_string())),
    }
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

/// 获取徽章实例详情
///
/// GET /v2/assertions/{entity_id}
pub async fn get_assertion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    let instance = assertion_for(&state, &auth, &entity_id, IssuerRule::Editor, Access::Read).await?;
    Ok(Json(V2Response::single(Related::new(&state).assertion(instance).await?)))
}

/// 更新徽章实例的可修改字段
///
/// PUT /v2/assertions/{entity_id}
pub async fn update_assertion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    payload: JsonBody<AssertionRequest>,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    let instance = assertion_for(&state, &auth, &entity_id, IssuerRule::Editor, Access::Write).await?;
    let Json(req) = payload?;

    let changes = req
        .into_changes(instance.recipient_type)
        .map_err(ApiError::FieldErrors)?;
    let instance = state.issuance.update(instance, changes).await?;
    info!(assertion = %instance.entity_id, user = %auth.account.entity_id(), "Assertion updated");

    Ok(Json(V2Response::single(Related::new(&state).assertion(instance).await?)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    pub revocation_reason: Option<String>,
}

/// 撤销徽章实例，撤销不可逆
///
/// DELETE /v2/assertions/{entity_id}
pub async fn revoke_assertion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(entity_id): Path<String>,
    body: Bytes,
) -> Result<Envelope<AssertionDto>> {
    auth.require_verified()?;
    let instance = assertion_for(&state, &auth, &entity_id, IssuerRule::Editor, Access::Write).await?;

    // 请求体可以为空，此时视为未提供原因
    let req: RevokeRequest = if body.is_empty() {
        RevokeRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let reason = req
        .revocation_reason
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ApiError::field("revocation_reason", "This field is required"))?;
    let instance = state.revocation.revoke(instance, &reason).await?;

    Ok(Json(V2Response::single(Related::new(&state).assertion(instance).await?)))
}

/// 变更流：调用方可见且在 `since` 之后修改过的实例，
/// `timestamp` 为查询开始前的时间，供下一次轮询使用
///
/// GET /v2/assertions/changed
pub async fn changed_since(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ChangedSinceQuery>,
    OriginalUri(uri): OriginalUri,
) -> Result<Envelope<AssertionDto>> {
    auth.require_scope(&[R_ASSERTIONS])?;
    let since = query.since.as_deref().map(parse_since).transpose()?;
    let num = parse_num(query.num.as_deref())?;

    let timestamp = Utc::now();
    let paginator = Paginator::new(state.page_size(num), query.cursor.as_deref())?;
    let instances: Vec<BadgeInstance> = state
        .repos
        .assertions
        .list_changed_since(auth.user_id(), since, paginator.page_request())
        .await?;
    let (instances, pagination) = paginator.finish(instances, state.urls.origin(), &uri);
    let result = Related::new(&state).assertions(instances).await?;
    Ok(Json(
        V2Response::ok(result)
            .with_pagination(Some(pagination))
            .with_timestamp(format_timestamp(&timestamp)),
    ))
}
