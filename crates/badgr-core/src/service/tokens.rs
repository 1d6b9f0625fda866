//! 访问令牌签发

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use badgr_shared::observability::metrics;

use crate::error::{CoreError, Result};
use crate::models::{AccessToken, Application, Issuer, NewAccessToken, StaffRole, generate_token};
use crate::repository::Repositories;

/// 发行方令牌响应条目
#[derive(Debug, Clone, Serialize)]
pub struct IssuerToken {
    pub issuer: String,
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// 发行方范围的 scope
pub fn issuer_scope(issuer_entity_id: &str) -> String {
    format!("rw:issuer:{}", issuer_entity_id)
}

pub struct TokenService {
    repos: Repositories,
    access_token_lifetime: TimeDelta,
    issuer_token_lifetime: TimeDelta,
}

impl TokenService {
    pub fn new(repos: Repositories, access_token_seconds: i64, issuer_token_weeks: i64) -> Self {
        Self {
            repos,
            access_token_lifetime: TimeDelta::try_seconds(access_token_seconds)
                .unwrap_or(TimeDelta::days(1)),
            issuer_token_lifetime: TimeDelta::try_weeks(issuer_token_weeks)
                .unwrap_or(TimeDelta::weeks(5200)),
        }
    }

    /// 口令模式与客户端模式共用：为用户签发新令牌
    #[instrument(skip(self))]
    pub async fn issue_access_token(
        &self,
        user_id: i64,
        application_id: i64,
        scope: &str,
    ) -> Result<AccessToken> {
        let token = self
            .repos
            .oauth
            .create_token(NewAccessToken {
                token: generate_token(),
                user_id: Some(user_id),
                application_id: Some(application_id),
                scope: scope.to_string(),
                expires: Utc::now() + self.access_token_lifetime,
            })
            .await?;
        info!(token_id = token.id, user_id, application_id, "Access token issued");
        Ok(token)
    }

    /// 为应用用户在每个发行方上取得（或复用）发行方范围的长期令牌，
    /// 并在其尚非成员时授予 staff 角色
    #[instrument(skip(self, application, issuers), fields(application = %application.client_id, count = issuers.len()))]
    pub async fn mint_issuer_tokens(
        &self,
        application: &Application,
        issuers: &[Issuer],
    ) -> Result<Vec<IssuerToken>> {
        let app_user = application.user_id.ok_or_else(|| {
            CoreError::validation("Application is not associated with a user")
        })?;
        let expires = Utc::now() + self.issuer_token_lifetime;

        let mut tokens = Vec::with_capacity(issuers.len());
        for issuer in issuers {
            let (_, granted) = self
                .repos
                .issuers
                .get_or_create_staff(issuer.id, app_user, StaffRole::Staff)
                .await?;
            if granted {
                info!(issuer = %issuer.entity_id, user_id = app_user, "Application user granted staff role");
            }

            let (token, created) = self
                .repos
                .oauth
                .get_or_create_token(NewAccessToken {
                    token: generate_token(),
                    user_id: Some(app_user),
                    application_id: Some(application.id),
                    scope: issuer_scope(&issuer.entity_id),
                    expires,
                })
                .await?;
            metrics::record_issuer_token(created);

            tokens.push(IssuerToken {
                issuer: issuer.entity_id.clone(),
                token: token.token,
                expires: token.expires,
            });
        }
        Ok(tokens)
    }
}
