//! Bearer 令牌认证中间件
//!
//! 校验 `Authorization: Bearer <token>`，加载令牌所属用户与应用，
//! 并将 [`AuthContext`] 注入请求扩展

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use chrono::Utc;
use tracing::debug;

use crate::auth::AuthContext;
use crate::error::{ApiError, Result};
use crate::state::AppState;

const MISSING_CREDENTIALS: &str = "Authentication credentials were not provided.";
const INVALID_TOKEN: &str = "Invalid token.";

/// 认证中间件，挂在 `/v2` 路由上
pub async fn bearer_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(Authorization(bearer)) = request.headers().typed_get::<Authorization<Bearer>>() else {
        return ApiError::Unauthorized(MISSING_CREDENTIALS.to_string()).into_response();
    };

    match authenticate(&state, bearer.token()).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

async fn authenticate(state: &AppState, token: &str) -> Result<AuthContext> {
    let invalid = || ApiError::Unauthorized(INVALID_TOKEN.to_string());

    let token = state.repos.oauth.get_token(token).await?.ok_or_else(invalid)?;
    if token.is_expired(Utc::now()) {
        debug!(token_id = token.id, "访问令牌已过期");
        return Err(invalid());
    }

    let user_id = token.user_id.ok_or_else(invalid)?;
    let account = state
        .repos
        .users
        .get_account(user_id)
        .await?
        .filter(|a| a.user.is_active)
        .ok_or_else(|| ApiError::Unauthorized("User inactive or deleted.".to_string()))?;

    let application = match token.application_id {
        Some(app_id) => state.repos.oauth.get_application(app_id).await?,
        None => None,
    };

    Ok(AuthContext {
        account,
        token,
        application,
    })
}
