use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::message::MessageType;

/// Any of these gates the content into the link family.
pub const URL_MARKERS: &[&str] = &["http://", "https://", "www."];

/// Link sub-types, checked in priority order. First hit wins.
pub const LINK_FAMILY: &[(MessageType, &[&str])] = &[
    (
        MessageType::Video,
        &[
            "youtube.com",
            "youtu.be",
            "vimeo.com",
            "tiktok.com",
            "mp4",
            "video",
        ],
    ),
    (
        MessageType::Image,
        &["jpg", "jpeg", "png", "gif", "image"],
    ),
    (
        MessageType::App,
        &["app", "play.google.com", "apps.apple.com"],
    ),
    (
        MessageType::File,
        &["pdf", "doc", "xls", "ppt", "zip", "file"],
    ),
];

// Declared priority order: the first matching label is the suggested category.
const CATEGORY_PATTERNS: &[(&str, &str)] = &[
    (
        "Technology",
        r"\b(tech|technology|programming|code|developer|software)\b",
    ),
    ("Food", r"\b(recipe|food|cooking|baking|meal|dish)\b"),
    (
        "Health & Fitness",
        r"\b(health|fitness|workout|exercise|diet|nutrition)\b",
    ),
    ("Finance", r"\b(finance|money|investing|stock|budget|saving)\b"),
    ("Travel", r"\b(travel|vacation|trip|tour|destination|hotel)\b"),
    (
        "Education",
        r"\b(education|learning|course|study|tutorial|lesson)\b",
    ),
    (
        "Entertainment",
        r"\b(entertainment|movie|film|show|series|music|song)\b",
    ),
    ("News", r"\b(news|article|report|update|headline)\b"),
    ("Shopping", r"\b(shopping|product|buy|purchase|store|shop)\b"),
    ("Tools", r"\b(tool|utility|app|application|software)\b"),
];

/// Curated keywords promoted to tags when they appear as whole words.
pub const TAG_KEYWORDS: &[&str] = &[
    "article",
    "book",
    "budget",
    "coding",
    "design",
    "event",
    "fitness",
    "food",
    "health",
    "idea",
    "investing",
    "meeting",
    "movie",
    "music",
    "news",
    "podcast",
    "programming",
    "project",
    "recipe",
    "reminder",
    "research",
    "shopping",
    "travel",
    "tutorial",
    "vacation",
    "video",
    "workout",
];

pub struct CategoryRule {
    pub label: &'static str,
    pub pattern: Regex,
}

pub static CATEGORY_RULES: Lazy<Vec<CategoryRule>> = Lazy::new(|| {
    CATEGORY_PATTERNS
        .iter()
        .filter_map(|&(label, pattern)| match Regex::new(&format!("(?i){pattern}")) {
            Ok(pattern) => Some(CategoryRule { label, pattern }),
            Err(e) => {
                warn!("skipping category rule {}: {}", label, e);
                None
            }
        })
        .collect()
});

pub static HASHTAG: Lazy<Option<Regex>> = Lazy::new(|| match Regex::new(r"#(\w+)") {
    Ok(re) => Some(re),
    Err(e) => {
        warn!("hashtag extraction disabled: {}", e);
        None
    }
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_rule_compiles() {
        assert_eq!(CATEGORY_RULES.len(), CATEGORY_PATTERNS.len());
        assert!(HASHTAG.is_some());
    }

    #[test]
    fn link_family_is_in_priority_order() {
        let order: Vec<MessageType> = LINK_FAMILY.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            order,
            vec![
                MessageType::Video,
                MessageType::Image,
                MessageType::App,
                MessageType::File
            ]
        );
    }
}
