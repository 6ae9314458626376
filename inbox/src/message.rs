use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Open key-value bag for channel-specific extras (sender, chat, provider ids, media).
pub type Metadata = Map<String, Value>;

/// The messaging channels a webhook can be tagged with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Telegram,
    Whatsapp,
    Sms,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Telegram, Source::Whatsapp, Source::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Telegram => "telegram",
            Source::Whatsapp => "whatsapp",
            Source::Sms => "sms",
        }
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "telegram" => Ok(Source::Telegram),
            "whatsapp" => Ok(Source::Whatsapp),
            "sms" => Ok(Source::Sms),
            _ => Err(format!("Unknown source: {s}")),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Link,
    Video,
    Image,
    File,
    App,
    Other,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Link => "link",
            MessageType::Video => "video",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::App => "app",
            MessageType::Other => "other",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "text" => Ok(MessageType::Text),
            "link" => Ok(MessageType::Link),
            "video" => Ok(MessageType::Video),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "app" => Ok(MessageType::App),
            "other" => Ok(MessageType::Other),
            _ => Err(format!("Unknown message type: {s}")),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, channel-agnostic message record.
///
/// `id` is `None` until a backend stores the record. Ids handed out by the
/// remote store are positive; ids handed out by the local cache while the
/// remote store is unreachable are provisional and strictly negative.
///
/// `message_type`, `category` and empty `tags` are the fields the classifier
/// is allowed to fill in. A stored record always carries a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub content: String,
    pub source: Source,
    #[serde(rename = "type", default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    pub fn new(content: impl Into<String>, source: Source, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            content: content.into(),
            source,
            message_type: None,
            category: None,
            tags: Vec::new(),
            created_at,
            starred: false,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Type written to storage; records that never went through the classifier are `other`.
    pub fn stored_type(&self) -> MessageType {
        self.message_type.unwrap_or(MessageType::Other)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            source: self.source,
            content: self.content.clone(),
            created_at_micros: self.created_at.timestamp_micros(),
        }
    }

    pub fn apply(&mut self, update: &MessageUpdate) {
        if let Some(content) = &update.content {
            self.content = content.clone();
        }
        if let Some(message_type) = update.message_type {
            self.message_type = Some(message_type);
        }
        if let Some(category) = &update.category {
            self.category = category.clone();
        }
        if let Some(tags) = &update.tags {
            self.tags = tags.clone();
        }
        if let Some(starred) = update.starred {
            self.starred = starred;
        }
        if let Some(metadata) = &update.metadata {
            self.metadata = metadata.clone();
        }
    }
}

/// Content identity used by reconciliation, independent of backend-assigned ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    source: Source,
    content: String,
    created_at_micros: i64,
}

/// Partial update of a stored message. Absent fields are left untouched;
/// `category: Some(None)` clears the category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MessageUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.message_type.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.starred.is_none()
            && self.metadata.is_none()
    }
}

// Distinguishes an explicit `null` (clear) from an absent field (keep).
fn present_or_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Listing criteria shared by every backend. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub source: Option<Source>,
    pub message_type: Option<MessageType>,
    pub category: Option<String>,
    pub starred: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        self.source.map_or(true, |s| message.source == s)
            && self
                .message_type
                .map_or(true, |t| message.message_type == Some(t))
            && self
                .category
                .as_ref()
                .map_or(true, |c| message.category.as_ref() == Some(c))
            && self.starred.map_or(true, |s| message.starred == s)
    }

    /// Drops the pagination bounds, keeping only the predicates.
    pub fn unbounded(&self) -> MessageFilter {
        MessageFilter {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

/// Newest first, ties broken by the higher id.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
