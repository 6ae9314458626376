use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::api::IngestError;
use crate::export::DateRange;
use crate::message::{Message, MessageFilter, MessageType, MessageUpdate, Source};
use crate::router;
use crate::storage::SyncReport;

/// Query string shared by listing, search and export.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub category: Option<String>,
    pub starred: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bound(name: &str, value: &Option<String>) -> Result<Option<DateTime<Utc>>, IngestError> {
    non_blank(value)
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| IngestError::InvalidQuery(format!("{name}: {e}")))
        })
        .transpose()
}

impl ListQuery {
    pub fn filter(&self) -> Result<MessageFilter, IngestError> {
        let source = non_blank(&self.source)
            .map(str::parse::<Source>)
            .transpose()
            .map_err(IngestError::InvalidQuery)?;
        let message_type = non_blank(&self.message_type)
            .map(str::parse::<MessageType>)
            .transpose()
            .map_err(IngestError::InvalidQuery)?;

        if self.limit.is_some_and(|l| l < 0) || self.offset.is_some_and(|o| o < 0) {
            return Err(IngestError::InvalidQuery(
                "limit and offset must not be negative".to_string(),
            ));
        }

        Ok(MessageFilter {
            source,
            message_type,
            category: non_blank(&self.category).map(str::to_string),
            starred: self.starred,
            limit: self.limit,
            offset: self.offset,
        })
    }

    pub fn range(&self) -> Result<DateRange, IngestError> {
        Ok(DateRange {
            from: parse_bound("from", &self.from)?,
            to: parse_bound("to", &self.to)?,
        })
    }
}

/// Newest first; with `q` the page is ranked by relevance instead.
#[instrument(skip(state))]
pub async fn list(
    state: State<router::State>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Message>>, IngestError> {
    let filter = query.filter()?;
    let messages = match non_blank(&query.q) {
        Some(q) => state.store.search(q, &filter).await?,
        None => state.store.list(&filter).await?,
    };
    Ok(Json(messages))
}

#[instrument(skip(state))]
pub async fn export(
    state: State<router::State>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, IngestError> {
    let filter = query.filter()?;
    let range = query.range()?;
    let csv = state.store.export_csv(&filter, &range).await?;

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"messages.csv\""),
        ],
        csv,
    ))
}

#[instrument(skip(state))]
pub async fn get_message(
    state: State<router::State>,
    Path(id): Path<i64>,
) -> Result<Json<Message>, IngestError> {
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or(IngestError::NotFound(id))
}

#[instrument(skip(state, changes))]
pub async fn update_message(
    state: State<router::State>,
    Path(id): Path<i64>,
    Json(changes): Json<MessageUpdate>,
) -> Result<Json<Message>, IngestError> {
    let updated = state.store.update(id, &changes).await?;
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn delete_message(
    state: State<router::State>,
    Path(id): Path<i64>,
) -> Result<StatusCode, IngestError> {
    state.store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn sync(state: State<router::State>) -> Result<Json<SyncReport>, IngestError> {
    Ok(Json(state.store.sync().await?))
}
