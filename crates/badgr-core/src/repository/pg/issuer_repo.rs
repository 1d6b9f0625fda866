//! 发行方仓储

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use crate::error::{CoreError, Result};
use crate::models::{Issuer, IssuerStaff, NewIssuer, StaffRole};
use crate::repository::IssuerRepositoryTrait;

const ISSUER_SELECT: &str = r#"
    SELECT i.id, i.entity_id, i.name, i.description, i.email, i.url, i.image,
           i.extensions, i.source_url, i.original_json, i.created_by,
           u.entity_id AS created_by_entity_id, i.created_at, i.updated_at
    FROM issuers i
    LEFT JOIN users u ON u.id = i.created_by
"#;

const STAFF_SELECT: &str = r#"
    SELECT s.id, s.issuer_id, s.user_id, u.entity_id AS user_entity_id, s.role, s.created_at
    FROM issuer_staff s
    JOIN users u ON u.id = s.user_id
"#;

pub struct IssuerRepository {
    pool: PgPool,
}

impl IssuerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Issuer>> {
        let issuer = sqlx::query_as::<_, Issuer>(&format!("{} WHERE {}", ISSUER_SELECT, clause))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(issuer)
    }

    async fn find_staff(&self, issuer_id: i64, user_id: i64) -> Result<Option<IssuerStaff>> {
        let staff = sqlx::query_as::<_, IssuerStaff>(&format!(
            "{} WHERE s.issuer_id = $1 AND s.user_id = $2",
            STAFF_SELECT
        ))
        .bind(issuer_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(staff)
    }
}

#[async_trait]
impl IssuerRepositoryTrait for IssuerRepository {
    async fn get(&self, id: i64) -> Result<Option<Issuer>> {
        let issuer = sqlx::query_as::<_, Issuer>(&format!("{} WHERE i.id = $1", ISSUER_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(issuer)
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<Issuer>> {
        self.fetch_one_where("i.entity_id = $1", entity_id).await
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Issuer>> {
        self.fetch_one_where("i.source_url = $1", source_url).await
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Issuer>> {
        let issuers = sqlx::query_as::<_, Issuer>(&format!(
            r#"
            {}
            WHERE i.id IN (SELECT issuer_id FROM issuer_staff WHERE user_id = $1)
            ORDER BY i.created_at DESC, i.id DESC
            "#,
            ISSUER_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(issuers)
    }

    #[instrument(skip(self, issuer), fields(entity_id = %issuer.entity_id))]
    async fn create(&self, issuer: NewIssuer, owner_id: Option<i64>) -> Result<Issuer> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO issuers (entity_id, name, description, email, url, image, extensions,
                                 source_url, original_json, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&issuer.entity_id)
        .bind(&issuer.name)
        .bind(&issuer.description)
        .bind(&issuer.email)
        .bind(&issuer.url)
        .bind(&issuer.image)
        .bind(&issuer.extensions)
        .bind(&issuer.source_url)
        .bind(&issuer.original_json)
        .bind(issuer.created_by)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(owner_id) = owner_id {
            sqlx::query("INSERT INTO issuer_staff (issuer_id, user_id, role) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(owner_id)
                .bind(StaffRole::Owner)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Issuer", issuer.entity_id))
    }

    async fn update(&self, issuer: &Issuer) -> Result<Issuer> {
        sqlx::query(
            r#"
            UPDATE issuers
            SET name = $2, description = $3, email = $4, url = $5, image = $6,
                extensions = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(issuer.id)
        .bind(&issuer.name)
        .bind(&issuer.description)
        .bind(&issuer.email)
        .bind(&issuer.url)
        .bind(&issuer.image)
        .bind(&issuer.extensions)
        .execute(&self.pool)
        .await?;

        self.get(issuer.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Issuer", issuer.entity_id.clone()))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM issuers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_staff(&self, issuer_id: i64) -> Result<Vec<IssuerStaff>> {
        let staff = sqlx::query_as::<_, IssuerStaff>(&format!(
            "{} WHERE s.issuer_id = $1 ORDER BY s.id ASC",
            STAFF_SELECT
        ))
        .bind(issuer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(staff)
    }

    #[instrument(skip(self))]
    async fn get_or_create_staff(
        &self,
        issuer_id: i64,
        user_id: i64,
        role: StaffRole,
    ) -> Result<(IssuerStaff, bool)> {
        if let Some(existing) = self.find_staff(issuer_id, user_id).await? {
            return Ok((existing, false));
        }

        // 并发创建时以唯一约束为准，冲突则回读
        let inserted = sqlx::query(
            r#"
            INSERT INTO issuer_staff (issuer_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (issuer_id, user_id) DO NOTHING
            "#,
        )
        .bind(issuer_id)
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let staff = self.find_staff(issuer_id, user_id).await?.ok_or_else(|| {
            CoreError::Internal(format!(
                "issuer_staff 写入后未找到: issuer_id={}, user_id={}",
                issuer_id, user_id
            ))
        })?;

        Ok((staff, inserted > 0))
    }
}
