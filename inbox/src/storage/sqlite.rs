use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::info;

use super::{StorageBackend, StorageError};
use crate::message::{Message, MessageFilter, MessageType, MessageUpdate, Metadata, Source};

const COLUMNS: &str = "id, content, source, type, category, tags, created_at, starred, metadata";

/// Offline cache in a single SQLite file.
///
/// Records created here get strictly negative ids so they can never collide
/// with the positive ids the remote store assigns. Tags and metadata are
/// stored as JSON text.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn open(path: impl AsRef<Path>) -> Result<SqliteBackend, StorageError> {
        let path = path.as_ref();
        info!("opening local cache at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|error| StorageError::ConnectionError { error })?;

        let backend = SqliteBackend { pool };
        backend.create_schema().await?;
        Ok(backend)
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                type TEXT NOT NULL,
                category TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                starred INTEGER NOT NULL DEFAULT 0,
                metadata TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::query("CREATE TABLE"))?;

        for column in ["source", "type", "category", "created_at", "starred"] {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS messages_{column}_idx ON messages ({column})"
            ))
            .execute(&self.pool)
            .await
            .map_err(StorageError::query("CREATE INDEX"))?;
        }
        Ok(())
    }

    async fn write(&self, id: i64, message: &Message) -> Result<(), StorageError> {
        let encoded = Encoded::new(message)?;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO messages ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(id)
        .bind(&message.content)
        .bind(message.source.as_str())
        .bind(message.stored_type().as_str())
        .bind(&message.category)
        .bind(&encoded.tags)
        .bind(&encoded.created_at)
        .bind(message.starred)
        .bind(&encoded.metadata)
        .execute(&self.pool)
        .await
        .map_err(StorageError::query("INSERT"))?;
        Ok(())
    }
}

// Text forms of the columns SQLite has no native type for.
struct Encoded {
    tags: String,
    created_at: String,
    metadata: String,
}

impl Encoded {
    fn new(message: &Message) -> Result<Encoded, StorageError> {
        Ok(Encoded {
            tags: serde_json::to_string(&message.tags)?,
            // fixed width so lexical order is chronological order
            created_at: message
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            metadata: serde_json::to_string(&message.metadata)?,
        })
    }
}

fn decode(row: &SqliteRow) -> Result<Message, StorageError> {
    let column = StorageError::query("SELECT");

    let id: i64 = row.try_get("id").map_err(&column)?;
    let source: String = row.try_get("source").map_err(&column)?;
    let message_type: String = row.try_get("type").map_err(&column)?;
    let tags: String = row.try_get("tags").map_err(&column)?;
    let created_at: String = row.try_get("created_at").map_err(&column)?;
    let metadata: Option<String> = row.try_get("metadata").map_err(&column)?;

    let metadata = match metadata {
        Some(metadata) => serde_json::from_str::<Metadata>(&metadata)?,
        None => Metadata::new(),
    };

    Ok(Message {
        id: Some(id),
        content: row.try_get("content").map_err(&column)?,
        source: source.parse::<Source>().map_err(StorageError::Corrupt)?,
        message_type: Some(
            message_type
                .parse::<MessageType>()
                .map_err(StorageError::Corrupt)?,
        ),
        category: row.try_get("category").map_err(&column)?,
        tags: serde_json::from_str(&tags)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StorageError::Corrupt(format!("created_at {created_at:?}: {e}")))?
            .with_timezone(&Utc),
        starred: row.try_get("starred").map_err(&column)?,
        metadata,
    })
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(&self, message: &Message) -> Result<i64, StorageError> {
        let encoded = Encoded::new(message)?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO messages ({COLUMNS})
            VALUES (
                (SELECT MIN(COALESCE(MIN(id), 0), 0) - 1 FROM messages),
                ?, ?, ?, ?, ?, ?, ?, ?
            )
            RETURNING id
            "#
        ))
        .bind(&message.content)
        .bind(message.source.as_str())
        .bind(message.stored_type().as_str())
        .bind(&message.category)
        .bind(&encoded.tags)
        .bind(&encoded.created_at)
        .bind(message.starred)
        .bind(&encoded.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::query("INSERT"))?;

        row.try_get("id").map_err(StorageError::query("INSERT"))
    }

    async fn put(&self, id: i64, message: &Message) -> Result<(), StorageError> {
        self.write(id, message).await
    }

    async fn get(&self, id: i64) -> Result<Option<Message>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::query("SELECT"))?;

        row.as_ref().map(decode).transpose()
    }

    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM messages WHERE 1 = 1"));
        if let Some(source) = filter.source {
            query.push(" AND source = ").push_bind(source.as_str());
        }
        if let Some(message_type) = filter.message_type {
            query.push(" AND type = ").push_bind(message_type.as_str());
        }
        if let Some(category) = &filter.category {
            query.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(starred) = filter.starred {
            query.push(" AND starred = ").push_bind(starred);
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        // LIMIT -1 means no limit in SQLite
        query
            .push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(-1));
        query
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0).max(0));

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::query("SELECT"))?;

        rows.iter().map(decode).collect()
    }

    async fn update(&self, id: i64, changes: &MessageUpdate) -> Result<Message, StorageError> {
        let mut message = self.get(id).await?.ok_or(StorageError::NotFound(id))?;
        message.apply(changes);
        self.write(id, &message).await?;
        Ok(message)
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::query("DELETE"))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use tempfile::TempDir;

    async fn open() -> (TempDir, SqliteBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("cache.db")).await.unwrap();
        (dir, backend)
    }

    fn message(content: &str, minutes: i64) -> Message {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Message::new(content, Source::Telegram, base + Duration::minutes(minutes))
    }

    #[tokio::test]
    async fn insert_assigns_strictly_negative_ids() {
        let (_dir, backend) = open().await;
        let first = backend.insert(&message("a", 0)).await.unwrap();
        let second = backend.insert(&message("b", 1)).await.unwrap();
        assert_eq!(first, -1);
        assert_eq!(second, -2);

        // a record re-keyed to a remote id does not reset the sequence
        backend.put(17, &message("c", 2)).await.unwrap();
        assert_eq!(backend.insert(&message("d", 3)).await.unwrap(), -3);
    }

    #[tokio::test]
    async fn round_trips_every_column() {
        let (_dir, backend) = open().await;
        let mut original = message("https://youtu.be/x", 0);
        original.created_at += Duration::microseconds(123_456);
        original.message_type = Some(MessageType::Video);
        original.category = Some("Entertainment".to_string());
        original.tags = vec!["music".to_string(), "weekend".to_string()];
        original.starred = true;
        original.metadata = json!({"chat": {"id": 5}}).as_object().unwrap().clone();

        let id = backend.insert(&original).await.unwrap();
        let stored = backend.get(id).await.unwrap().unwrap();

        assert_eq!(stored, Message { id: Some(id), ..original });
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let (_dir, backend) = open().await;
        let mut starred = message("starred", 5);
        starred.starred = true;
        backend.insert(&message("old", 0)).await.unwrap();
        backend.insert(&starred).await.unwrap();
        backend.insert(&message("new", 10)).await.unwrap();

        let all = backend.list(&MessageFilter::default()).await.unwrap();
        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["new", "starred", "old"]);

        let only_starred = backend
            .list(&MessageFilter {
                starred: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(only_starred.len(), 1);
        assert_eq!(only_starred[0].content, "starred");

        let page = backend
            .list(&MessageFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page[0].content, "starred");
    }

    #[tokio::test]
    async fn update_and_delete() {
        let (_dir, backend) = open().await;
        let id = backend.insert(&message("draft", 0)).await.unwrap();

        let updated = backend
            .update(
                id,
                &MessageUpdate {
                    starred: Some(true),
                    category: Some(Some("Tools".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.starred);
        assert_eq!(backend.get(id).await.unwrap(), Some(updated));

        backend.delete(id).await.unwrap();
        assert_eq!(backend.get(id).await.unwrap(), None);
        assert!(matches!(
            backend.delete(id).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.update(id, &MessageUpdate::default()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn schema_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let backend = SqliteBackend::open(&path).await.unwrap();
            backend.insert(&message("persisted", 0)).await.unwrap();
        }
        let backend = SqliteBackend::open(&path).await.unwrap();
        let all = backend.list(&MessageFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
