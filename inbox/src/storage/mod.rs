//! Persistence contract and its backends.
//!
//! [`HybridStore`] coordinates a durable remote backend and an optional local
//! cache, falling back between them according to a [`FallbackPolicy`].

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{Message, MessageFilter, MessageUpdate};

pub mod fallback;
pub mod hybrid;
pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use fallback::{FallbackPolicy, Tier};
pub use hybrid::{HybridStore, SyncReport};

/// Errors originate from sqlx and the JSON columns, and are wrapped to carry
/// which operation failed.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("failed to encode or decode a JSON column: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
    #[error("message {0} not found")]
    NotFound(i64),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("all backends failed, primary: {primary}; fallback: {fallback}")]
    AllBackendsFailed {
        primary: Box<StorageError>,
        fallback: Box<StorageError>,
    },
}

impl StorageError {
    pub(crate) fn query(command: &str) -> impl Fn(sqlx::Error) -> StorageError + '_ {
        move |error| StorageError::QueryError {
            command: command.to_owned(),
            error,
        }
    }

    /// True when the backend could not be reached at all, as opposed to
    /// rejecting the operation.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StorageError::ConnectionError { .. } | StorageError::Unavailable(_) => true,
            StorageError::QueryError { error, .. } => matches!(
                error,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::WorkerCrashed
            ),
            StorageError::AllBackendsFailed { .. } => true,
            _ => false,
        }
    }

    pub fn to_metric_tag(&self) -> &'static str {
        match self {
            StorageError::ConnectionError { .. } => "connection",
            StorageError::QueryError { .. } => "query",
            StorageError::Serialization(_) => "serialization",
            StorageError::Corrupt(_) => "corrupt",
            StorageError::NotFound(_) => "not_found",
            StorageError::Unavailable(_) => "unavailable",
            StorageError::AllBackendsFailed { .. } => "all_backends_failed",
        }
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stores a new message and returns the id the backend assigned to it.
    /// Any id already set on `message` is ignored.
    async fn insert(&self, message: &Message) -> Result<i64, StorageError>;

    /// Inserts or replaces the message stored under `id`.
    async fn put(&self, id: i64, message: &Message) -> Result<(), StorageError>;

    async fn get(&self, id: i64) -> Result<Option<Message>, StorageError>;

    /// Matching messages, newest first.
    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError>;

    async fn update(&self, id: i64, changes: &MessageUpdate) -> Result<Message, StorageError>;

    async fn delete(&self, id: i64) -> Result<(), StorageError>;
}
