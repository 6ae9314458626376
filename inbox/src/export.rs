//! Flat CSV projection of stored messages.

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, WriterBuilder};
use thiserror::Error;

use crate::message::Message;
use crate::normalize::format_timestamp;
use crate::storage::StorageError;

pub const HEADER: [&str; 8] = [
    "ID",
    "Content",
    "Source",
    "Type",
    "Category",
    "Tags",
    "Created At",
    "Starred",
];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV: {0}")]
    Flush(String),
}

/// Inclusive bounds on `createdAt`; a missing bound is open.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| timestamp >= from)
            && self.to.map_or(true, |to| timestamp <= to)
    }
}

pub fn to_csv(messages: &[Message]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for message in messages {
        let id = message.id.map(|id| id.to_string()).unwrap_or_default();
        let tags = message.tags.join(";");
        let created_at = format_timestamp(message.created_at);
        writer.write_record([
            id.as_str(),
            message.content.as_str(),
            message.source.as_str(),
            message.stored_type().as_str(),
            message.category.as_deref().unwrap_or_default(),
            tags.as_str(),
            created_at.as_str(),
            if message.starred { "Yes" } else { "No" },
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Flush(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, Source};
    use chrono::{Duration, TimeZone};

    fn message(id: i64, content: &str) -> Message {
        let mut message = Message::new(
            content,
            Source::Whatsapp,
            Utc.with_ymd_and_hms(2024, 4, 2, 18, 30, 0).unwrap(),
        );
        message.id = Some(id);
        message
    }

    #[test]
    fn renders_header_and_flattened_rows() {
        let mut link = message(7, "https://example.com/a.pdf");
        link.message_type = Some(MessageType::File);
        link.category = Some("Education".to_string());
        link.tags = vec!["study".to_string(), "exam".to_string()];
        link.starred = true;

        let csv = to_csv(&[link, message(8, "plain")]).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "ID,Content,Source,Type,Category,Tags,Created At,Starred");
        assert_eq!(
            lines[1],
            "7,https://example.com/a.pdf,whatsapp,file,Education,study;exam,2024-04-02T18:30:00.000Z,Yes"
        );
        assert_eq!(lines[2], "8,plain,whatsapp,other,,,2024-04-02T18:30:00.000Z,No");
    }

    #[test]
    fn special_characters_are_quoted() {
        let csv = to_csv(&[message(1, "eggs, milk and \"good\" bread\nthanks")]).unwrap();
        assert!(csv.contains("\"eggs, milk and \"\"good\"\" bread\nthanks\""));

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "eggs, milk and \"good\" bread\nthanks");
    }

    #[test]
    fn date_range_is_inclusive_and_open_ended() {
        let at = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();
        let range = DateRange {
            from: Some(at),
            to: Some(at + Duration::days(1)),
        };
        assert!(range.contains(at));
        assert!(range.contains(at + Duration::days(1)));
        assert!(!range.contains(at - Duration::seconds(1)));
        assert!(DateRange::default().contains(at));
    }
}
