use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_log::RawWebhookEvent;
use crate::export::ExportError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid source. Must be one of \"telegram\", \"whatsapp\" or \"sms\"")]
    InvalidSource,
    #[error("Unsupported content type. Use application/json or application/x-www-form-urlencoded")]
    UnsupportedMediaType,
    #[error("Invalid JSON body: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),

    #[error("Invalid content. Must provide a content field with a non-empty string value")]
    MissingContent,
    #[error("No message content found in the request")]
    EmptyBody,
    #[error("Invalid Telegram webhook data. No message found.")]
    MissingTelegramMessage,
    #[error("Unsupported Telegram message: no text and no recognized media kind")]
    UnrecognizedTelegramMessage,

    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("message {0} not found")]
    NotFound(i64),

    #[error("Failed to process message")]
    Persistence(#[source] StorageError),
    #[error("Failed to export messages")]
    Export(#[source] ExportError),
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => IngestError::NotFound(id),
            err => IngestError::Persistence(err),
        }
    }
}

impl From<ExportError> for IngestError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Storage(err) => err.into(),
            err => IngestError::Export(err),
        }
    }
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::InvalidSource
            | IngestError::RequestParsingError(_)
            | IngestError::RequestDecodingError(_)
            | IngestError::MissingContent
            | IngestError::EmptyBody
            | IngestError::MissingTelegramMessage
            | IngestError::UnrecognizedTelegramMessage
            | IngestError::InvalidQuery(_) => StatusCode::BAD_REQUEST,

            IngestError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            IngestError::NotFound(_) => StatusCode::NOT_FOUND,

            IngestError::Persistence(_) | IngestError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_metric_tag(&self) -> &'static str {
        match self {
            IngestError::InvalidSource => "invalid_source",
            IngestError::UnsupportedMediaType => "unsupported_media_type",
            IngestError::RequestParsingError(_) => "req_parsing",
            IngestError::RequestDecodingError(_) => "req_decoding",
            IngestError::MissingContent => "missing_content",
            IngestError::EmptyBody => "empty_body",
            IngestError::MissingTelegramMessage => "missing_telegram_message",
            IngestError::UnrecognizedTelegramMessage => "unrecognized_telegram_message",
            IngestError::InvalidQuery(_) => "invalid_query",
            IngestError::NotFound(_) => "not_found",
            IngestError::Persistence(_) => "persistence",
            IngestError::Export(_) => "export",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let details = match &self {
            IngestError::Persistence(err) => Some(err.to_string()),
            IngestError::Export(err) => Some(err.to_string()),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            details,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Lightweight acknowledgment expected by the Telegram bot platform.
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelegramAck {
    pub ok: bool,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReceiveResponse {
    pub success: bool,
    pub id: Option<i64>,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_messages: Option<Vec<RawWebhookEvent>>,
}

/// Liveness payload of the per-channel webhook routes.
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebhookStatus {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_client_statuses() {
        assert_eq!(IngestError::InvalidSource.status(), StatusCode::BAD_REQUEST);
        assert_eq!(IngestError::EmptyBody.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            IngestError::UnsupportedMediaType.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn storage_errors_convert_by_kind() {
        let not_found: IngestError = StorageError::NotFound(12).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let unavailable: IngestError = StorageError::Unavailable("down".to_string()).into();
        assert_eq!(unavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(unavailable.to_metric_tag(), "persistence");
    }
}
