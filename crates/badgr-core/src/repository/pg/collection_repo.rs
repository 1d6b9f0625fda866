//! 背包收藏集仓储

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{CoreError, Result};
use crate::models::{BackpackCollection, NewCollection};
use crate::repository::CollectionRepositoryTrait;

const COLLECTION_COLUMNS: &str =
    "id, entity_id, owner_id, name, description, share_hash, created_at, updated_at";

pub struct CollectionRepository {
    pool: PgPool,
}

impl CollectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 加载收藏集中的实例 entity_id（按 position 排序）
    async fn load_items(&self, mut collection: BackpackCollection) -> Result<BackpackCollection> {
        collection.assertions = sqlx::query_scalar(
            r#"
            SELECT bi.entity_id
            FROM backpack_collection_items ci
            JOIN badge_instances bi ON bi.id = ci.badge_instance_id
            WHERE ci.collection_id = $1
            ORDER BY ci.position ASC, ci.id ASC
            "#,
        )
        .bind(collection.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(collection)
    }

    async fn replace_items(
        tx: &mut Transaction<'_, Postgres>,
        collection_id: i64,
        assertions: &[String],
    ) -> Result<()> {
        sqlx::query("DELETE FROM backpack_collection_items WHERE collection_id = $1")
            .bind(collection_id)
            .execute(&mut **tx)
            .await?;

        for (position, entity_id) in assertions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO backpack_collection_items (collection_id, badge_instance_id, position)
                SELECT $1, id, $3 FROM badge_instances WHERE entity_id = $2
                ON CONFLICT (collection_id, badge_instance_id) DO NOTHING
                "#,
            )
            .bind(collection_id)
            .bind(entity_id)
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<BackpackCollection>> {
        let collection = sqlx::query_as::<_, BackpackCollection>(&format!(
            "SELECT {} FROM backpack_collections WHERE {}",
            COLLECTION_COLUMNS, clause
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        match collection {
            Some(c) => Ok(Some(self.load_items(c).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CollectionRepositoryTrait for CollectionRepository {
    async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<BackpackCollection>> {
        let collections = sqlx::query_as::<_, BackpackCollection>(&format!(
            "SELECT {} FROM backpack_collections WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            COLLECTION_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut loaded = Vec::with_capacity(collections.len());
        for collection in collections {
            loaded.push(self.load_items(collection).await?);
        }
        Ok(loaded)
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BackpackCollection>> {
        self.fetch_one_where("entity_id = $1", entity_id).await
    }

    async fn get_by_share_hash(&self, share_hash: &str) -> Result<Option<BackpackCollection>> {
        self.fetch_one_where("share_hash = $1", share_hash).await
    }

    async fn create(&self, collection: NewCollection) -> Result<BackpackCollection> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO backpack_collections (entity_id, owner_id, name, description, share_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&collection.entity_id)
        .bind(collection.owner_id)
        .bind(&collection.name)
        .bind(&collection.description)
        .bind(&collection.share_hash)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_items(&mut tx, id, &collection.assertions).await?;
        tx.commit().await?;

        self.get_by_entity_id(&collection.entity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BackpackCollection", collection.entity_id))
    }

    async fn update(&self, collection: &BackpackCollection) -> Result<BackpackCollection> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE backpack_collections
            SET name = $2, description = $3, share_hash = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(collection.id)
        .bind(&collection.name)
        .bind(&collection.description)
        .bind(&collection.share_hash)
        .execute(&mut *tx)
        .await?;

        Self::replace_items(&mut tx, collection.id, &collection.assertions).await?;
        tx.commit().await?;

        self.get_by_entity_id(&collection.entity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BackpackCollection", collection.entity_id.clone()))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM backpack_collections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_assertion(&self, badge_instance_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM backpack_collection_items WHERE badge_instance_id = $1")
            .bind(badge_instance_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
