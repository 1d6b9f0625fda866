//! OAuth 应用与令牌仓储

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use crate::error::Result;
use crate::models::{AccessToken, Application, NewAccessToken};
use crate::repository::OAuthRepositoryTrait;

const APPLICATION_COLUMNS: &str =
    "id, client_id, client_secret_hash, name, user_id, allowed_scopes, created_at";
const TOKEN_COLUMNS: &str =
    "id, token, user_id, application_id, scope, expires, created_at, updated_at";

pub struct OAuthRepository {
    pool: PgPool,
}

impl OAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_token_for(&self, defaults: &NewAccessToken) -> Result<Option<AccessToken>> {
        let token = sqlx::query_as::<_, AccessToken>(&format!(
            r#"
            SELECT {}
            FROM access_tokens
            WHERE user_id IS NOT DISTINCT FROM $1
              AND application_id IS NOT DISTINCT FROM $2
              AND scope = $3
            ORDER BY id ASC
            LIMIT 1
            "#,
            TOKEN_COLUMNS
        ))
        .bind(defaults.user_id)
        .bind(defaults.application_id)
        .bind(&defaults.scope)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }
}

#[async_trait]
impl OAuthRepositoryTrait for OAuthRepository {
    async fn get_application(&self, id: i64) -> Result<Option<Application>> {
        let app = sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM oauth_applications WHERE id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(app)
    }

    async fn get_application_by_client_id(&self, client_id: &str) -> Result<Option<Application>> {
        let app = sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM oauth_applications WHERE client_id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(app)
    }

    async fn create_application<'a>(
        &self,
        client_id: &str,
        client_secret_hash: Option<&'a str>,
        name: &str,
        user_id: Option<i64>,
        allowed_scopes: &str,
    ) -> Result<Application> {
        let app = sqlx::query_as::<_, Application>(&format!(
            r#"
            INSERT INTO oauth_applications (client_id, client_secret_hash, name, user_id, allowed_scopes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(client_id)
        .bind(client_secret_hash)
        .bind(name)
        .bind(user_id)
        .bind(allowed_scopes)
        .fetch_one(&self.pool)
        .await?;

        Ok(app)
    }

    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let token = sqlx::query_as::<_, AccessToken>(&format!(
            "SELECT {} FROM access_tokens WHERE token = $1",
            TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn create_token(&self, token: NewAccessToken) -> Result<AccessToken> {
        let created = sqlx::query_as::<_, AccessToken>(&format!(
            r#"
            INSERT INTO access_tokens (token, user_id, application_id, scope, expires)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.application_id)
        .bind(&token.scope)
        .bind(token.expires)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    #[instrument(skip(self, defaults), fields(scope = %defaults.scope))]
    async fn get_or_create_token(&self, defaults: NewAccessToken) -> Result<(AccessToken, bool)> {
        if let Some(existing) = self.find_token_for(&defaults).await? {
            return Ok((existing, false));
        }
        let created = self.create_token(defaults).await?;
        Ok((created, true))
    }
}
