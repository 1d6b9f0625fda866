//! OAuth 令牌端点与发行方令牌
//!
//! `/o/token` 支持口令模式与客户端模式；`/v2/issuer-tokens` 为应用用户
//! 在指定发行方上签发长期的实体范围令牌

use axum::{
    Extension, Form, Json,
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
};
use chrono::Utc;
use tracing::info;

use badgr_core::models::{Application, IdentifierType, PUBLIC_CLIENT_ID, role_of, split_scopes};
use badgr_core::service::IssuerToken;

use super::{Envelope, JsonBody};
use crate::auth::scopes::{DEFAULT_PASSWORD_SCOPES, RW_ISSUER};
use crate::auth::{AuthContext, verify_password};
use crate::dto::{IssuerTokensRequest, TokenRequest, TokenResponse, V2Response};
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// 表单与 JSON 两种编码都接受
async fn read_token_request(request: Request) -> Result<TokenRequest> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        let Json(req) = Json::<TokenRequest>::from_request(request, &())
            .await
            .map_err(|_| ApiError::oauth("invalid_request"))?;
        Ok(req)
    } else {
        let Form(req) = Form::<TokenRequest>::from_request(request, &())
            .await
            .map_err(|_| ApiError::oauth("invalid_request"))?;
        Ok(req)
    }
}

fn client_secret_matches(application: &Application, secret: Option<&str>) -> bool {
    match (&application.client_secret_hash, secret) {
        (None, _) => true,
        (Some(hash), Some(secret)) => verify_password(secret, hash),
        (Some(_), None) => false,
    }
}

/// 请求的 scope 必须全部在应用允许范围内；未指定时取默认值
fn granted_scope(application: &Application, requested: Option<&str>, default: &str) -> Result<String> {
    let scope = requested
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default);
    let scopes = split_scopes(scope);
    if scopes.is_empty() || !application.allows(&scopes) {
        return Err(ApiError::oauth("invalid_scope"));
    }
    Ok(scopes.join(" "))
}

async fn load_application(state: &AppState, client_id: &str) -> Result<Application> {
    state
        .repos
        .oauth
        .get_application_by_client_id(client_id)
        .await?
        .ok_or_else(|| ApiError::oauth("invalid_client"))
}

/// 签发访问令牌
///
/// POST /o/token
pub async fn token(State(state): State<AppState>, request: Request) -> Result<Json<TokenResponse>> {
    let req = read_token_request(request).await?;

    let (user_id, application, scope) = match req.grant_type.as_deref() {
        Some("password") => password_grant(&state, &req).await?,
        Some("client_credentials") => client_credentials_grant(&state, &req).await?,
        _ => return Err(ApiError::oauth("unsupported_grant_type")),
    };

    let token = state
        .tokens
        .issue_access_token(user_id, application.id, &scope)
        .await?;
    Ok(Json(TokenResponse {
        expires_in: token.seconds_to_expiration(Utc::now()),
        access_token: token.token,
        token_type: "Bearer",
        scope: token.scope,
    }))
}

/// 用户名为已验证的邮箱
async fn password_grant(state: &AppState, req: &TokenRequest) -> Result<(i64, Application, String)> {
    let client_id = req.client_id.as_deref().unwrap_or(PUBLIC_CLIENT_ID);
    let application = load_application(state, client_id).await?;
    if !client_secret_matches(&application, req.client_secret.as_deref()) {
        return Err(ApiError::oauth("invalid_client"));
    }

    let (Some(username), Some(password)) = (req.username.as_deref(), req.password.as_deref()) else {
        return Err(ApiError::oauth("invalid_request"));
    };
    let account = state
        .repos
        .users
        .find_account_by_identifier(username.trim(), IdentifierType::Email)
        .await?
        .filter(|a| a.user.is_active)
        .ok_or_else(|| ApiError::oauth("invalid_grant"))?;
    let password_ok = account
        .user
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(password, hash));
    if !password_ok {
        info!(client_id = %application.client_id, "口令模式认证失败");
        return Err(ApiError::oauth("invalid_grant"));
    }

    let default_scope = if application.client_id == PUBLIC_CLIENT_ID {
        DEFAULT_PASSWORD_SCOPES
    } else {
        application.allowed_scopes.as_str()
    };
    let scope = granted_scope(&application, req.scope.as_deref(), default_scope)?;
    Ok((account.id(), application, scope))
}

/// 令牌以应用所属用户的身份行事
async fn client_credentials_grant(
    state: &AppState,
    req: &TokenRequest,
) -> Result<(i64, Application, String)> {
    let (Some(client_id), Some(secret)) = (req.client_id.as_deref(), req.client_secret.as_deref()) else {
        return Err(ApiError::oauth("invalid_client"));
    };
    let application = load_application(state, client_id).await?;
    if application.client_secret_hash.is_none() || !client_secret_matches(&application, Some(secret)) {
        return Err(ApiError::oauth("invalid_client"));
    }
    let user_id = application
        .user_id
        .ok_or_else(|| ApiError::oauth("invalid_client"))?;

    let scope = granted_scope(&application, req.scope.as_deref(), &application.allowed_scopes)?;
    Ok((user_id, application, scope))
}

/// 为 OAuth 应用用户签发发行方范围令牌，必要时授予 staff 角色
///
/// POST /v2/issuer-tokens
pub async fn issuer_tokens(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: JsonBody<IssuerTokensRequest>,
) -> Result<Envelope<IssuerToken>> {
    auth.require_verified()?;
    auth.require_scope(&[RW_ISSUER])?;
    let application = auth.require_application()?.clone();
    let Json(req) = payload?;

    let entity_ids = req
        .issuers
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| ApiError::field("issuers", "field is required"))?;

    let mut issuers = Vec::with_capacity(entity_ids.len());
    for entity_id in &entity_ids {
        let issuer = state
            .repos
            .issuers
            .get_by_entity_id(entity_id)
            .await?
            .ok_or_else(|| ApiError::field("issuers", "unknown issuer"))?;
        let staff = state.repos.issuers.list_staff(issuer.id).await?;
        if role_of(&staff, auth.user_id()).is_none() {
            return Err(ApiError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ));
        }
        issuers.push(issuer);
    }

    let tokens = state.tokens.mint_issuer_tokens(&application, &issuers).await?;
    Ok(Json(V2Response::ok(tokens)))
}
