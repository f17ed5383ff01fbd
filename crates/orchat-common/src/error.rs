//! Orchat Error Types
//!
//! Centralized error handling for all Orchat components

use std::fmt;

/// Main error type for Orchat operations
#[derive(Debug)]
pub enum ChatError {
    /// Generic error with message
    Generic(String),
    /// IO-related errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(serde_json::Error),
    /// Thread/message persistence errors
    Storage(String),
    /// Configuration errors
    Config(String),
    /// Completion stream open/read failures
    Transport(String),
    /// Tool lookup or execution errors
    Tool(String),
    /// A deadline expired before the operation finished
    Timeout(String),
    /// The caller cancelled the operation
    Cancelled,
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Generic(msg) => write!(f, "Orchat error: {}", msg),
            ChatError::Io(err) => write!(f, "IO error: {}", err),
            ChatError::Serde(err) => write!(f, "Serialization error: {}", err),
            ChatError::Storage(msg) => write!(f, "Storage error: {}", msg),
            ChatError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ChatError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ChatError::Tool(msg) => write!(f, "Tool error: {}", msg),
            ChatError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            ChatError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChatError::Io(err) => Some(err),
            ChatError::Serde(err) => Some(err),
            _ => None,
        }
    }
}

/// Convenience result type for Orchat operations
pub type Result<T> = std::result::Result<T, ChatError>;

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Io(err)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serde(err)
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            ChatError::Storage("disk full".into()).to_string(),
            "Storage error: disk full"
        );
        assert_eq!(ChatError::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_from_serde_keeps_source() {
        let err: ChatError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ChatError::Serde(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
