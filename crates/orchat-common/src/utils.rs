//! Common utility functions used across Orchat components

use crate::constants::{DEFAULT_THREAD_TITLE, THREAD_TITLE_MAX_CHARS};
use crate::types::{Message, Role};
use chrono::Utc;
use uuid::Uuid;

/// Generate a unique ID for various entities
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get current UTC timestamp as milliseconds
pub fn current_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Title of a thread: its first user message, shortened
pub fn derive_thread_title(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| truncate_chars(&m.content, THREAD_TITLE_MAX_CHARS))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| DEFAULT_THREAD_TITLE.to_string())
}

/// Sum of message costs, missing costs counting as zero
pub fn total_cost(messages: &[Message]) -> f64 {
    messages.iter().filter_map(|m| m.cost).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_title_from_first_user_message() {
        let long = "x".repeat(80);
        let messages = vec![Message::system("be nice"), Message::user(long.clone())];
        assert_eq!(derive_thread_title(&messages), long[..50]);
        assert_eq!(derive_thread_title(&[]), "New Chat");
    }

    #[test]
    fn test_total_cost_ignores_missing() {
        let mut a = Message::assistant("a");
        a.cost = Some(0.25);
        let messages = vec![Message::user("q"), a];
        assert!((total_cost(&messages) - 0.25).abs() < 1e-12);
    }
}
