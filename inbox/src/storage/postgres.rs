use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use super::{StorageBackend, StorageError};
use crate::message::{Message, MessageFilter, MessageType, MessageUpdate, Metadata, Source};

const COLUMNS: &str = r#""id", "content", "source", "type", "category", "tags", "createdAt", "starred", "metadata""#;

/// Durable store and source of truth, backed by the `"Message"` table.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i32,
    content: String,
    source: String,
    #[sqlx(rename = "type")]
    message_type: String,
    category: Option<String>,
    tags: Vec<String>,
    #[sqlx(rename = "createdAt")]
    created_at: DateTime<Utc>,
    starred: bool,
    metadata: Option<Json<Metadata>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: Some(i64::from(row.id)),
            content: row.content,
            source: row.source.parse::<Source>().map_err(StorageError::Corrupt)?,
            message_type: Some(
                row.message_type
                    .parse::<MessageType>()
                    .map_err(StorageError::Corrupt)?,
            ),
            category: row.category,
            tags: row.tags,
            created_at: row.created_at,
            starred: row.starred,
            metadata: row.metadata.map(|m| m.0).unwrap_or_default(),
        })
    }
}

// Ids are SERIAL; anything outside i32 cannot exist remotely.
fn row_id(id: i64) -> Option<i32> {
    i32::try_from(id).ok()
}

impl PostgresBackend {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PostgresBackend, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|error| StorageError::ConnectionError { error })?;

        Ok(PostgresBackend { pool })
    }

    pub fn from_pool(pool: PgPool) -> PostgresBackend {
        PostgresBackend { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn fetch(&self, id: i32) -> Result<Option<Message>, StorageError> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!(r#"SELECT {COLUMNS} FROM "Message" WHERE "id" = $1"#))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::query("SELECT"))?;

        row.map(Message::try_from).transpose()
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, message: &Message) -> Result<i64, StorageError> {
        let id: i32 = sqlx::query_scalar(
            r#"
INSERT INTO "Message"
    ("content", "source", "type", "category", "tags", "createdAt", "starred", "metadata")
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8)
RETURNING "id"
            "#,
        )
        .bind(&message.content)
        .bind(message.source.as_str())
        .bind(message.stored_type().as_str())
        .bind(&message.category)
        .bind(&message.tags)
        .bind(message.created_at)
        .bind(message.starred)
        .bind(Json(&message.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::query("INSERT"))?;

        Ok(i64::from(id))
    }

    /// Upserts under an explicit id. This does not advance the id sequence.
    async fn put(&self, id: i64, message: &Message) -> Result<(), StorageError> {
        let id = row_id(id)
            .ok_or_else(|| StorageError::Corrupt(format!("id {id} is out of range")))?;

        sqlx::query(
            r#"
INSERT INTO "Message"
    ("id", "content", "source", "type", "category", "tags", "createdAt", "starred", "metadata")
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT ("id") DO UPDATE SET
    "content" = EXCLUDED."content",
    "source" = EXCLUDED."source",
    "type" = EXCLUDED."type",
    "category" = EXCLUDED."category",
    "tags" = EXCLUDED."tags",
    "createdAt" = EXCLUDED."createdAt",
    "starred" = EXCLUDED."starred",
    "metadata" = EXCLUDED."metadata"
            "#,
        )
        .bind(id)
        .bind(&message.content)
        .bind(message.source.as_str())
        .bind(message.stored_type().as_str())
        .bind(&message.category)
        .bind(&message.tags)
        .bind(message.created_at)
        .bind(message.starred)
        .bind(Json(&message.metadata))
        .execute(&self.pool)
        .await
        .map_err(StorageError::query("UPSERT"))?;

        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Message>, StorageError> {
        match row_id(id) {
            Some(id) => self.fetch(id).await,
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!(r#"SELECT {COLUMNS} FROM "Message" WHERE TRUE"#));
        if let Some(source) = filter.source {
            query.push(r#" AND "source" = "#).push_bind(source.as_str());
        }
        if let Some(message_type) = filter.message_type {
            query.push(r#" AND "type" = "#).push_bind(message_type.as_str());
        }
        if let Some(category) = &filter.category {
            query.push(r#" AND "category" = "#).push_bind(category.clone());
        }
        if let Some(starred) = filter.starred {
            query.push(r#" AND "starred" = "#).push_bind(starred);
        }
        query.push(r#" ORDER BY "createdAt" DESC, "id" DESC"#);
        // LIMIT NULL means no limit
        query.push(" LIMIT ").push_bind(filter.limit);
        query
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0).max(0));

        let rows: Vec<MessageRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::query("SELECT"))?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn update(&self, id: i64, changes: &MessageUpdate) -> Result<Message, StorageError> {
        let row_id = row_id(id).ok_or(StorageError::NotFound(id))?;

        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|error| StorageError::ConnectionError { error })?;

        let row: Option<MessageRow> = sqlx::query_as(&format!(
            r#"SELECT {COLUMNS} FROM "Message" WHERE "id" = $1 FOR UPDATE"#
        ))
        .bind(row_id)
        .fetch_optional(&mut *txn)
        .await
        .map_err(StorageError::query("SELECT"))?;

        let mut message = Message::try_from(row.ok_or(StorageError::NotFound(id))?)?;
        message.apply(changes);

        sqlx::query(
            r#"
UPDATE "Message"
SET
    "content" = $2,
    "type" = $3,
    "category" = $4,
    "tags" = $5,
    "starred" = $6,
    "metadata" = $7
WHERE
    "id" = $1
            "#,
        )
        .bind(row_id)
        .bind(&message.content)
        .bind(message.stored_type().as_str())
        .bind(&message.category)
        .bind(&message.tags)
        .bind(message.starred)
        .bind(Json(&message.metadata))
        .execute(&mut *txn)
        .await
        .map_err(StorageError::query("UPDATE"))?;

        txn.commit().await.map_err(StorageError::query("COMMIT"))?;

        Ok(message)
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        let row_id = row_id(id).ok_or(StorageError::NotFound(id))?;

        let result = sqlx::query(r#"DELETE FROM "Message" WHERE "id" = $1"#)
            .bind(row_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::query("DELETE"))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }
}
