//! 徽章定义仓储

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use crate::error::{CoreError, Result};
use crate::models::{BadgeClass, NewBadgeClass};
use crate::repository::BadgeClassRepositoryTrait;

const BADGE_CLASS_SELECT: &str = r#"
    SELECT bc.id, bc.entity_id, bc.issuer_id, i.entity_id AS issuer_entity_id, bc.name,
           bc.description, bc.image, bc.criteria_url, bc.criteria_text, bc.alignments, bc.tags,
           bc.expires_amount, bc.expires_duration, bc.extensions, bc.source_url,
           bc.original_json, bc.created_by, u.entity_id AS created_by_entity_id,
           bc.created_at, bc.updated_at
    FROM badge_classes bc
    JOIN issuers i ON i.id = bc.issuer_id
    LEFT JOIN users u ON u.id = bc.created_by
"#;

pub struct BadgeClassRepository {
    pool: PgPool,
}

impl BadgeClassRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<BadgeClass>> {
        let badge_class =
            sqlx::query_as::<_, BadgeClass>(&format!("{} WHERE {}", BADGE_CLASS_SELECT, clause))
                .bind(value)
                .fetch_optional(&self.pool)
                .await?;
        Ok(badge_class)
    }
}

#[async_trait]
impl BadgeClassRepositoryTrait for BadgeClassRepository {
    async fn get(&self, id: i64) -> Result<Option<BadgeClass>> {
        let badge_class =
            sqlx::query_as::<_, BadgeClass>(&format!("{} WHERE bc.id = $1", BADGE_CLASS_SELECT))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(badge_class)
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BadgeClass>> {
        self.fetch_one_where("bc.entity_id = $1", entity_id).await
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<BadgeClass>> {
        self.fetch_one_where("bc.source_url = $1", source_url).await
    }

    async fn find_by_name(&self, issuer_id: i64, name: &str) -> Result<Vec<BadgeClass>> {
        let badge_classes = sqlx::query_as::<_, BadgeClass>(&format!(
            "{} WHERE bc.issuer_id = $1 AND lower(bc.name) = lower($2) ORDER BY bc.id ASC",
            BADGE_CLASS_SELECT
        ))
        .bind(issuer_id)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(badge_classes)
    }

    async fn list_for_issuer(&self, issuer_id: i64) -> Result<Vec<BadgeClass>> {
        let badge_classes = sqlx::query_as::<_, BadgeClass>(&format!(
            "{} WHERE bc.issuer_id = $1 ORDER BY bc.created_at DESC, bc.id DESC",
            BADGE_CLASS_SELECT
        ))
        .bind(issuer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(badge_classes)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<BadgeClass>> {
        let badge_classes = sqlx::query_as::<_, BadgeClass>(&format!(
            r#"
            {}
            WHERE bc.issuer_id IN (SELECT issuer_id FROM issuer_staff WHERE user_id = $1)
            ORDER BY bc.created_at DESC, bc.id DESC
            "#,
            BADGE_CLASS_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(badge_classes)
    }

    #[instrument(skip(self, badge_class), fields(entity_id = %badge_class.entity_id))]
    async fn create(&self, badge_class: NewBadgeClass) -> Result<BadgeClass> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO badge_classes (entity_id, issuer_id, name, description, image,
                                       criteria_url, criteria_text, alignments, tags,
                                       expires_amount, expires_duration, extensions,
                                       source_url, original_json, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(&badge_class.entity_id)
        .bind(badge_class.issuer_id)
        .bind(&badge_class.name)
        .bind(&badge_class.description)
        .bind(&badge_class.image)
        .bind(&badge_class.criteria_url)
        .bind(&badge_class.criteria_text)
        .bind(Json(&badge_class.alignments))
        .bind(Json(&badge_class.tags))
        .bind(badge_class.expires_amount)
        .bind(badge_class.expires_duration)
        .bind(&badge_class.extensions)
        .bind(&badge_class.source_url)
        .bind(&badge_class.original_json)
        .bind(badge_class.created_by)
        .fetch_one(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("BadgeClass", badge_class.entity_id))
    }

    async fn update(&self, badge_class: &BadgeClass) -> Result<BadgeClass> {
        sqlx::query(
            r#"
            UPDATE badge_classes
            SET name = $2, description = $3, image = $4, criteria_url = $5, criteria_text = $6,
                alignments = $7, tags = $8, expires_amount = $9, expires_duration = $10,
                extensions = $11, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(badge_class.id)
        .bind(&badge_class.name)
        .bind(&badge_class.description)
        .bind(&badge_class.image)
        .bind(&badge_class.criteria_url)
        .bind(&badge_class.criteria_text)
        .bind(&badge_class.alignments)
        .bind(&badge_class.tags)
        .bind(badge_class.expires_amount)
        .bind(badge_class.expires_duration)
        .bind(&badge_class.extensions)
        .execute(&self.pool)
        .await?;

        self.get(badge_class.id)
            .await?
            .ok_or_else(|| CoreError::not_found("BadgeClass", badge_class.entity_id.clone()))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM badge_classes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
