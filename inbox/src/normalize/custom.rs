use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::api::IngestError;
use crate::message::{Message, MessageType, Metadata, Source};

/// Generic JSON schema for producers that post messages directly.
///
/// Only `content` is required. Classification fields the producer sets are
/// kept as-is; the classifier only fills in the ones left out.
#[derive(Debug, Deserialize)]
struct CustomPayload {
    content: Option<Value>,
    metadata: Option<Value>,
    #[serde(rename = "type")]
    message_type: Option<MessageType>,
    category: Option<String>,
    tags: Option<Vec<String>>,
    starred: Option<bool>,
}

pub fn normalize(
    source: Source,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Message, IngestError> {
    let payload: CustomPayload = serde_json::from_slice(body)?;

    let content = match payload.content {
        Some(Value::String(content)) if !content.trim().is_empty() => content,
        _ => return Err(IngestError::MissingContent),
    };

    let metadata = match payload.metadata {
        None | Some(Value::Null) => Metadata::new(),
        Some(Value::Object(metadata)) => metadata,
        Some(_) => {
            return Err(IngestError::RequestDecodingError(
                "metadata must be a JSON object".to_string(),
            ))
        }
    };

    let mut message = Message::new(content, source, received_at).with_metadata(metadata);
    message.message_type = payload.message_type;
    message.category = payload.category.filter(|c| !c.trim().is_empty());
    message.tags = payload.tags.unwrap_or_default();
    message.starred = payload.starred.unwrap_or(false);

    Ok(message)
}
