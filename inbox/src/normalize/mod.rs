//! Per-channel payload decoders.
//!
//! Each decoder produces a canonical [`Message`] with its channel-specific
//! identifiers tucked into `metadata`. Classification happens later.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::api::IngestError;
use crate::message::{Message, Source};

pub mod custom;
pub mod telegram;
pub mod twilio;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
}

impl BodyKind {
    pub fn from_content_type(content_type: Option<&str>) -> Result<BodyKind, IngestError> {
        let content_type = content_type.unwrap_or_default().to_lowercase();
        if content_type.contains("application/json") {
            Ok(BodyKind::Json)
        } else if content_type.contains("application/x-www-form-urlencoded") {
            Ok(BodyKind::Form)
        } else {
            Err(IngestError::UnsupportedMediaType)
        }
    }
}

/// Decodes a webhook body into a canonical message.
///
/// JSON bodies are Telegram update envelopes when the source is `telegram`
/// and the generic custom schema otherwise. Form bodies always follow the
/// Twilio callback layout.
pub fn normalize(
    source: Source,
    kind: BodyKind,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Message, IngestError> {
    match (kind, source) {
        (BodyKind::Json, Source::Telegram) => telegram::normalize(body, received_at),
        (BodyKind::Json, source) => custom::normalize(source, body, received_at),
        (BodyKind::Form, source) => twilio::normalize(source, body, received_at),
    }
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn content_type_selects_decode_path() {
        assert_eq!(
            BodyKind::from_content_type(Some("application/json; charset=utf-8")).unwrap(),
            BodyKind::Json
        );
        assert_eq!(
            BodyKind::from_content_type(Some("Application/X-WWW-Form-Urlencoded")).unwrap(),
            BodyKind::Form
        );
        assert!(matches!(
            BodyKind::from_content_type(Some("text/plain")),
            Err(IngestError::UnsupportedMediaType)
        ));
        assert!(matches!(
            BodyKind::from_content_type(None),
            Err(IngestError::UnsupportedMediaType)
        ));
    }

    #[test]
    fn json_for_non_telegram_sources_uses_custom_schema() {
        let now = Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap();
        let message = normalize(
            Source::Whatsapp,
            BodyKind::Json,
            br#"{"content": "hello"}"#,
            now,
        )
        .unwrap();
        assert_eq!(message.source, Source::Whatsapp);
        assert_eq!(message.content, "hello");

        // a Telegram-shaped envelope is not valid custom JSON
        let err = normalize(
            Source::Sms,
            BodyKind::Json,
            br#"{"message": {"text": "hi"}}"#,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::MissingContent));
    }
}
