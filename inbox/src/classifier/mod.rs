//! Heuristic content classification.
//!
//! Classification sits on the ingestion path, so nothing in here returns an
//! error: every function is total and degrades to `text`, no category and no
//! tags when it has nothing to say.

use crate::message::{Message, MessageType};

pub mod rules;
pub mod search;

pub use search::enhance_search;

pub trait Classify {
    fn detect_type(&self, content: &str) -> MessageType;

    /// Every matching category label, in rule priority order.
    fn suggest_categories(&self, content: &str) -> Vec<String>;

    /// Lowercased, de-duplicated tags. Empty when nothing matches.
    fn extract_tags(&self, content: &str) -> Vec<String>;

    fn suggest_category(&self, content: &str) -> Option<String> {
        self.suggest_categories(content).into_iter().next()
    }

    /// Returns a copy with `type`, `category` and `tags` filled in where the
    /// caller left them unset. Fields already set are carried over as-is.
    fn process(&self, message: &Message) -> Message {
        let mut processed = message.clone();
        if processed.message_type.is_none() {
            processed.message_type = Some(self.detect_type(&message.content));
        }
        if processed.category.is_none() {
            processed.category = self.suggest_category(&message.content);
        }
        if processed.tags.is_empty() {
            processed.tags = self.extract_tags(&message.content);
        }
        processed
    }
}

#[derive(Clone, Default)]
pub struct HeuristicClassifier {}

impl Classify for HeuristicClassifier {
    fn detect_type(&self, content: &str) -> MessageType {
        let content = content.to_lowercase();

        if !rules::URL_MARKERS.iter().any(|m| content.contains(m)) {
            return MessageType::Text;
        }

        rules::LINK_FAMILY
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| content.contains(n)))
            .map_or(MessageType::Link, |(message_type, _)| *message_type)
    }

    fn suggest_categories(&self, content: &str) -> Vec<String> {
        rules::CATEGORY_RULES
            .iter()
            .filter(|rule| rule.pattern.is_match(content))
            .map(|rule| rule.label.to_string())
            .collect()
    }

    fn extract_tags(&self, content: &str) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        let mut push = |tag: String| {
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        };

        if let Some(hashtag) = rules::HASHTAG.as_ref() {
            for capture in hashtag.captures_iter(content) {
                if let Some(tag) = capture.get(1) {
                    push(tag.as_str().to_lowercase());
                }
            }
        }

        let lowered = content.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        for keyword in rules::TAG_KEYWORDS {
            if words.contains(keyword) {
                push(keyword.to_string());
            }
        }

        tags
    }
}
