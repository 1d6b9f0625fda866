//! 徽章实例仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use crate::error::{CoreError, Result};
use crate::models::{Acceptance, AssertionFilter, BadgeInstance, NewBadgeInstance};
use crate::repository::{AssertionRepositoryTrait, PageRequest};

const INSTANCE_SELECT: &str = r#"
    SELECT bi.id, bi.entity_id, bi.badgeclass_id, bc.entity_id AS badgeclass_entity_id,
           bi.issuer_id, i.entity_id AS issuer_entity_id, bi.recipient_identifier,
           bi.recipient_type, bi.hashed, bi.salt, bi.issued_on, bi.expires_at, bi.narrative,
           bi.evidence, bi.extensions, bi.revoked, bi.revocation_reason, bi.acceptance,
           bi.image, bi.source_url, bi.original_json, bi.create_notification, bi.created_by,
           u.entity_id AS created_by_entity_id, bi.created_at, bi.updated_at
    FROM badge_instances bi
    JOIN badge_classes bc ON bc.id = bi.badgeclass_id
    JOIN issuers i ON i.id = bi.issuer_id
    LEFT JOIN users u ON u.id = bi.created_by
"#;

pub struct AssertionRepository {
    pool: PgPool,
}

impl AssertionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<BadgeInstance>> {
        let instance =
            sqlx::query_as::<_, BadgeInstance>(&format!("{} WHERE {}", INSTANCE_SELECT, clause))
                .bind(value)
                .fetch_optional(&self.pool)
                .await?;
        Ok(instance)
    }

    async fn insert(tx: &mut Transaction<'_, Postgres>, instance: &NewBadgeInstance) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO badge_instances (entity_id, badgeclass_id, issuer_id, recipient_identifier,
                                         recipient_type, hashed, salt, issued_on, expires_at,
                                         narrative, evidence, extensions, acceptance, image,
                                         source_url, original_json, create_notification, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING id
            "#,
        )
        .bind(&instance.entity_id)
        .bind(instance.badgeclass_id)
        .bind(instance.issuer_id)
        .bind(&instance.recipient_identifier)
        .bind(instance.recipient_type)
        .bind(instance.hashed)
        .bind(&instance.salt)
        .bind(instance.issued_on)
        .bind(instance.expires_at)
        .bind(&instance.narrative)
        .bind(Json(&instance.evidence))
        .bind(&instance.extensions)
        .bind(instance.acceptance)
        .bind(&instance.image)
        .bind(&instance.source_url)
        .bind(&instance.original_json)
        .bind(instance.create_notification)
        .bind(instance.created_by)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<BadgeInstance>> {
        let instances = sqlx::query_as::<_, BadgeInstance>(&format!(
            "{} WHERE bi.id = ANY($1) ORDER BY bi.id ASC",
            INSTANCE_SELECT
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(instances)
    }
}

#[async_trait]
impl AssertionRepositoryTrait for AssertionRepository {
    async fn get(&self, id: i64) -> Result<Option<BadgeInstance>> {
        let instance =
            sqlx::query_as::<_, BadgeInstance>(&format!("{} WHERE bi.id = $1", INSTANCE_SELECT))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(instance)
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BadgeInstance>> {
        self.fetch_one_where("bi.entity_id = $1", entity_id).await
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<BadgeInstance>> {
        self.fetch_one_where("bi.source_url = $1", source_url).await
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        filter: &AssertionFilter,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Vec<BadgeInstance>> {
        let instances = sqlx::query_as::<_, BadgeInstance>(&format!(
            r#"
            {}
            WHERE ($1::bigint IS NULL OR bi.badgeclass_id = $1)
              AND ($2::bigint IS NULL OR bi.issuer_id = $2)
              AND (cardinality($3::text[]) = 0 OR bi.recipient_identifier = ANY($3))
              AND ($4 OR bi.expires_at IS NULL OR bi.expires_at >= $5)
              AND ($6 OR bi.revoked = FALSE)
            ORDER BY bi.created_at DESC, bi.id DESC
            LIMIT $7 OFFSET $8
            "#,
            INSTANCE_SELECT
        ))
        .bind(filter.badgeclass_id)
        .bind(filter.issuer_id)
        .bind(&filter.recipients)
        .bind(filter.include_expired)
        .bind(now)
        .bind(filter.include_revoked)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(instances)
    }

    async fn list_for_recipients(&self, identifiers: &[String]) -> Result<Vec<BadgeInstance>> {
        if identifiers.is_empty() {
            return Ok(vec![]);
        }
        let lowered: Vec<String> = identifiers.iter().map(|i| i.to_lowercase()).collect();

        let instances = sqlx::query_as::<_, BadgeInstance>(&format!(
            r#"
            {}
            WHERE lower(bi.recipient_identifier) = ANY($1)
              AND bi.revoked = FALSE
              AND bi.acceptance <> $2
            ORDER BY bi.issued_on DESC, bi.id DESC
            "#,
            INSTANCE_SELECT
        ))
        .bind(&lowered)
        .bind(Acceptance::Rejected)
        .fetch_all(&self.pool)
        .await?;

        Ok(instances)
    }

    #[instrument(skip(self))]
    async fn list_changed_since(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Vec<BadgeInstance>> {
        // 可见性：接收者（通过已验证标识）持有由请求者应用签发的背包令牌，或请求者是发行方成员
        let instances = sqlx::query_as::<_, BadgeInstance>(&format!(
            r#"
            {}
            WHERE (
                EXISTS (
                    SELECT 1
                    FROM user_identifiers ui
                    JOIN access_tokens t ON t.user_id = ui.user_id
                    JOIN oauth_applications app ON app.id = t.application_id
                    WHERE ui.verified = TRUE
                      AND lower(ui.identifier) = lower(bi.recipient_identifier)
                      AND app.user_id = $1
                      AND regexp_split_to_array(t.scope, '\s+') && ARRAY['r:backpack', 'rw:backpack']
                )
                OR EXISTS (
                    SELECT 1 FROM issuer_staff s
                    WHERE s.issuer_id = bi.issuer_id AND s.user_id = $1
                )
            )
              AND ($2::timestamptz IS NULL OR bi.updated_at > $2)
            ORDER BY bi.updated_at ASC, bi.id ASC
            LIMIT $3 OFFSET $4
            "#,
            INSTANCE_SELECT
        ))
        .bind(user_id)
        .bind(since)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(instances)
    }

    async fn has_current_award(
        &self,
        badgeclass_id: i64,
        recipient_identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM badge_instances
                WHERE badgeclass_id = $1
                  AND recipient_identifier = $2
                  AND revoked = FALSE
                  AND (expires_at IS NULL OR expires_at >= $3)
            )
            "#,
        )
        .bind(badgeclass_id)
        .bind(recipient_identifier)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self, instance), fields(entity_id = %instance.entity_id))]
    async fn create(&self, instance: NewBadgeInstance) -> Result<BadgeInstance> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert(&mut tx, &instance).await?;
        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("BadgeInstance", instance.entity_id))
    }

    #[instrument(skip(self, instances), fields(count = instances.len()))]
    async fn create_many(&self, instances: Vec<NewBadgeInstance>) -> Result<Vec<BadgeInstance>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(instances.len());
        for instance in &instances {
            ids.push(Self::insert(&mut tx, instance).await?);
        }
        tx.commit().await?;

        self.fetch_by_ids(&ids).await
    }

    async fn update(&self, instance: &BadgeInstance) -> Result<BadgeInstance> {
        sqlx::query(
            r#"
            UPDATE badge_instances
            SET recipient_identifier = $2, recipient_type = $3, hashed = $4, salt = $5,
                issued_on = $6, expires_at = $7, narrative = $8, evidence = $9, extensions = $10,
                acceptance = $11,
                image = CASE WHEN revoked THEN image ELSE $12 END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(instance.id)
        .bind(&instance.recipient_identifier)
        .bind(instance.recipient_type)
        .bind(instance.hashed)
        .bind(&instance.salt)
        .bind(instance.issued_on)
        .bind(instance.expires_at)
        .bind(&instance.narrative)
        .bind(&instance.evidence)
        .bind(&instance.extensions)
        .bind(instance.acceptance)
        .bind(&instance.image)
        .execute(&self.pool)
        .await?;

        self.get(instance.id)
            .await?
            .ok_or_else(|| CoreError::not_found("BadgeInstance", instance.entity_id.clone()))
    }

    #[instrument(skip(self))]
    async fn revoke(&self, id: i64, reason: &str) -> Result<BadgeInstance> {
        let result = sqlx::query(
            r#"
            UPDATE badge_instances
            SET revoked = TRUE, revocation_reason = $2, image = NULL, updated_at = NOW()
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        let instance = self
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("BadgeInstance", id.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(CoreError::AlreadyRevoked);
        }
        Ok(instance)
    }

    async fn count_for_badgeclass(&self, badgeclass_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM badge_instances WHERE badgeclass_id = $1")
                .bind(badgeclass_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_for_issuer(&self, issuer_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM badge_instances WHERE issuer_id = $1")
                .bind(issuer_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
