//! Name suggestion collaborator
//!
//! The reducer asks a [`NameSuggester`] for a name when the user lets the
//! name-response window lapse. Hosts plug in their own generator; the
//! keyword-based default keeps the flow deterministic.

use crate::context::ContentType;

/// Produces a name for a new artifact from the user's original request.
pub trait NameSuggester: Send + Sync {
    fn suggest_name(&self, original_request: &str, content_type: ContentType) -> String;
}

const MAX_NAME_WORDS: usize = 3;

const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "make", "create", "build", "generate", "me", "my", "for", "please", "i",
    "want", "need", "to", "can", "you", "could", "would", "new", "with", "of", "and", "that",
    "simple", "some", "app", "applet", "application", "page", "document", "image", "picture",
];

/// Builds a title from the leading content words of the request plus a
/// noun for the content type, e.g. "make a todo app" -> "Todo Helper".
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordNameSuggester;

impl KeywordNameSuggester {
    fn noun(content_type: ContentType) -> &'static str {
        match content_type {
            ContentType::Applet => "Helper",
            ContentType::Page => "Page",
            ContentType::Document => "Notes",
            ContentType::Image => "Artwork",
        }
    }
}

impl NameSuggester for KeywordNameSuggester {
    fn suggest_name(&self, original_request: &str, content_type: ContentType) -> String {
        let noun = Self::noun(content_type);
        let lowered = original_request.to_lowercase();

        let mut words: Vec<String> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty() && !FILLER_WORDS.contains(word))
            .take(MAX_NAME_WORDS)
            .map(title_case)
            .collect();

        if words.is_empty() {
            return format!("Untitled {}", noun);
        }
        if words.last().map(String::as_str) != Some(noun) {
            words.push(noun.to_string());
        }
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
