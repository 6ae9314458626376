use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::api::IngestError;
use crate::message::{Message, Metadata, Source};
use crate::normalize::format_timestamp;

/// Update fields that may carry the message object, in lookup order.
const MESSAGE_FIELDS: &[&str] = &[
    "message",
    "edited_message",
    "channel_post",
    "edited_channel_post",
];

/// Non-text kinds and the placeholder stored as their content, in lookup order.
pub const PLACEHOLDERS: &[(&str, &str)] = &[
    ("photo", "[Photo]"),
    ("sticker", "[Sticker]"),
    ("voice", "[Voice Message]"),
    ("document", "[Document]"),
    ("video", "[Video]"),
    ("audio", "[Audio]"),
    ("location", "[Location]"),
];

pub fn normalize(body: &[u8], received_at: DateTime<Utc>) -> Result<Message, IngestError> {
    let update: Value = serde_json::from_slice(body)?;

    let message = MESSAGE_FIELDS
        .iter()
        .filter_map(|field| update.get(field))
        .find(|value| value.is_object())
        .ok_or(IngestError::MissingTelegramMessage)?;

    let content = extract_content(message).ok_or(IngestError::UnrecognizedTelegramMessage)?;
    let metadata = extract_metadata(message, &update, received_at);

    Ok(Message::new(content, Source::Telegram, received_at).with_metadata(metadata))
}

fn extract_content(message: &Value) -> Option<String> {
    if let Some(text) = message.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.to_string());
        }
    }

    PLACEHOLDERS
        .iter()
        .find(|(kind, _)| message.get(kind).is_some_and(|v| !v.is_null()))
        .map(|(_, placeholder)| placeholder.to_string())
}

// Copies the listed fields of `object` under new names, skipping absent ones.
fn pick(object: Option<&Value>, fields: &[(&str, &str)]) -> Value {
    let mut picked = Map::new();
    if let Some(object) = object {
        for (to, from) in fields {
            if let Some(value) = object.get(from).filter(|v| !v.is_null()) {
                picked.insert(to.to_string(), value.clone());
            }
        }
    }
    Value::Object(picked)
}

fn extract_metadata(message: &Value, update: &Value, received_at: DateTime<Utc>) -> Metadata {
    let mut metadata = Metadata::new();

    metadata.insert(
        "from".to_string(),
        pick(
            message.get("from"),
            &[
                ("id", "id"),
                ("username", "username"),
                ("firstName", "first_name"),
                ("lastName", "last_name"),
            ],
        ),
    );
    metadata.insert(
        "chat".to_string(),
        pick(message.get("chat"), &[("id", "id"), ("type", "type")]),
    );
    if let Some(message_id) = message.get("message_id") {
        metadata.insert("messageId".to_string(), message_id.clone());
    }
    if let Some(date) = message.get("date") {
        metadata.insert("date".to_string(), date.clone());
    }
    if let Some(caption) = message.get("caption").and_then(Value::as_str) {
        metadata.insert("caption".to_string(), Value::String(caption.to_string()));
    }
    metadata.insert(
        "timestamp".to_string(),
        Value::String(format_timestamp(received_at)),
    );
    metadata.insert("rawUpdate".to_string(), update.clone());

    metadata
}
