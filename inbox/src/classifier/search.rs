use crate::message::Message;

const CONTENT_MATCH: f64 = 10.0;
const CONTENT_KEYWORD: f64 = 2.0;
const CATEGORY_MATCH: f64 = 5.0;
const TAG_MATCH: f64 = 3.0;
const TAG_KEYWORD: f64 = 1.0;
const STARRED_BOOST: f64 = 1.2;

/// Relevance of a message for an already-lowercased query and its keywords.
fn score(query: &str, keywords: &[&str], message: &Message) -> f64 {
    let content = message.content.to_lowercase();
    let mut score = 0.0;

    if content.contains(query) {
        score += CONTENT_MATCH;
    }
    score += CONTENT_KEYWORD * keywords.iter().filter(|k| content.contains(*k)).count() as f64;

    if let Some(category) = &message.category {
        if category.to_lowercase().contains(query) {
            score += CATEGORY_MATCH;
        }
    }

    for tag in &message.tags {
        let tag = tag.to_lowercase();
        if tag.contains(query) {
            score += TAG_MATCH;
        }
        score += TAG_KEYWORD * keywords.iter().filter(|k| tag.contains(*k)).count() as f64;
    }

    if message.starred {
        score *= STARRED_BOOST;
    }
    score
}

/// Ranks candidates against a free-text query.
///
/// Zero-score candidates are dropped. The sort is stable, so candidates with
/// equal scores keep their input order.
pub fn enhance_search(query: &str, candidates: Vec<Message>) -> Vec<Message> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    let keywords: Vec<&str> = query
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect();

    let mut scored: Vec<(f64, Message)> = candidates
        .into_iter()
        .map(|message| (score(&query, &keywords, &message), message))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored.into_iter().map(|(_, message)| message).collect()
}
