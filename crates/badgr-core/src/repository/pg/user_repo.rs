//! 用户仓储

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use crate::entity_id;
use crate::error::Result;
use crate::models::{IdentifierType, User, UserAccount, UserIdentifier};
use crate::repository::UserRepositoryTrait;

const USER_COLUMNS: &str =
    "id, entity_id, first_name, last_name, password_hash, is_active, created_at, updated_at";

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn identifiers(&self, user_id: i64) -> Result<Vec<UserIdentifier>> {
        let identifiers = sqlx::query_as::<_, UserIdentifier>(
            r#"
            SELECT id, user_id, identifier, identifier_type, verified, created_at
            FROM user_identifiers
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(identifiers)
    }
}

#[async_trait]
impl UserRepositoryTrait for UserRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_entity_id(&self, entity_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE entity_id = $1",
            USER_COLUMNS
        ))
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_account(&self, user_id: i64) -> Result<Option<UserAccount>> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(None);
        };
        let identifiers = self.identifiers(user.id).await?;
        Ok(Some(UserAccount::new(user, identifiers)))
    }

    #[instrument(skip(self))]
    async fn find_account_by_identifier(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<Option<UserAccount>> {
        let user_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT user_id
            FROM user_identifiers
            WHERE lower(identifier) = lower($1) AND identifier_type = $2 AND verified = TRUE
            "#,
        )
        .bind(identifier)
        .bind(identifier_type)
        .fetch_optional(&self.pool)
        .await?;

        match user_id {
            Some(id) => self.get_account(id).await,
            None => Ok(None),
        }
    }

    async fn create_user<'a>(
        &self,
        first_name: &str,
        last_name: &str,
        password_hash: Option<&'a str>,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (entity_id, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(entity_id::generate())
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn add_identifier(
        &self,
        user_id: i64,
        identifier: &str,
        identifier_type: IdentifierType,
        verified: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_identifiers (user_id, identifier, identifier_type, verified)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(identifier)
        .bind(identifier_type)
        .bind(verified)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
