use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::api::IngestError;
use crate::message::{Message, Metadata, Source};
use crate::normalize::format_timestamp;

/// Upper bound on `NumMedia`; Twilio itself caps attachments at 10.
const MAX_MEDIA: usize = 10;

pub fn normalize(
    source: Source,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Message, IngestError> {
    let params: HashMap<String, String> = serde_urlencoded::from_bytes(body)
        .map_err(|e| IngestError::RequestDecodingError(format!("invalid form body: {e}")))?;

    let content = params
        .get("Body")
        .filter(|body| !body.is_empty())
        .cloned()
        .ok_or(IngestError::EmptyBody)?;

    let field = |name: &str| Value::String(params.get(name).cloned().unwrap_or_default());

    let mut metadata = Metadata::new();
    metadata.insert("from".to_string(), field("From"));
    metadata.insert("to".to_string(), field("To"));
    metadata.insert("messageSid".to_string(), field("MessageSid"));
    metadata.insert("accountSid".to_string(), field("AccountSid"));
    metadata.insert("profileName".to_string(), field("ProfileName"));
    metadata.insert(
        "timestamp".to_string(),
        Value::String(format_timestamp(received_at)),
    );

    let num_media = params
        .get("NumMedia")
        .and_then(|n| n.trim().parse::<usize>().ok())
        .unwrap_or(0)
        .min(MAX_MEDIA);
    if num_media > 0 {
        let media: Vec<Value> = (0..num_media)
            .map(|i| {
                json!({
                    "contentType": field(&format!("MediaContentType{i}")),
                    "url": field(&format!("MediaUrl{i}")),
                })
            })
            .collect();
        metadata.insert("media".to_string(), Value::Array(media));
    }

    Ok(Message::new(content, source, received_at).with_metadata(metadata))
}
