//! Chat data model shared by the orchestrator, the tools and the stores

use crate::pricing::ModelPricing;
use crate::utils::current_timestamp_millis;
use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(crate::error::ChatError::Generic(format!(
                "Unknown message role: {}",
                other
            ))),
        }
    }
}

/// Token accounting for one assistant message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl TokenUsage {
    /// Usage with `total_tokens` derived from the two counts
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            reasoning_tokens: None,
        }
    }
}

/// One ranked web search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Kind of intermediate action shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Thinking,
    Search,
    Result,
}

/// Lifecycle of a reasoning step. Ordered so that a step only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Active,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
}

/// UI-facing record of an intermediate action within a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub id: String,
    pub kind: StepKind,
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StepMetadata>,
}

impl ReasoningStep {
    pub fn new(id: impl Into<String>, kind: StepKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            status: StepStatus::Pending,
            metadata: None,
        }
    }

    /// Move the step to `status`. Returns false, leaving the step untouched,
    /// when that would be a regression.
    pub fn advance(&mut self, status: StepStatus) -> bool {
        if status < self.status {
            return false;
        }
        self.status = status;
        true
    }

    pub fn is_active(&self) -> bool {
        self.status == StepStatus::Active
    }

    /// Mark the step complete with its final label and metadata
    pub fn complete(&mut self, label: impl Into<String>, metadata: Option<StepMetadata>) {
        if self.advance(StepStatus::Complete) {
            self.label = label.into();
            self.metadata = metadata;
        }
    }
}

/// A chat message. `id` stays `None` until the store assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub reasoning: Vec<ReasoningStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Creation time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            reasoning: Vec::new(),
            usage: None,
            cost: None,
            timestamp: current_timestamp_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Externally supplied description of a model; read-only to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub context_length: u64,
    pub pricing: ModelPricing,
    pub supports_tools: bool,
}

/// Persisted conversation header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    pub title: String,
    pub model_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub total_cost: f64,
}

/// Partial update of a thread; `None` fields are left unchanged
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadUpdate {
    pub title: Option<String>,
    pub model_id: Option<String>,
    pub total_cost: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_never_regresses() {
        let mut step = ReasoningStep::new("s1", StepKind::Search, "Searching...");
        assert!(step.advance(StepStatus::Active));
        assert!(step.advance(StepStatus::Complete));
        assert!(!step.advance(StepStatus::Active));
        assert_eq!(step.status, StepStatus::Complete);
    }

    #[test]
    fn test_complete_sets_label_and_metadata() {
        let mut step = ReasoningStep::new("s1", StepKind::Search, "Searching...");
        step.advance(StepStatus::Active);
        step.complete(
            "tokyo weather",
            Some(StepMetadata {
                search_query: Some("tokyo weather".into()),
                search_results: vec![],
            }),
        );
        assert_eq!(step.label, "tokyo weather");
        assert!(step.metadata.is_some());
        assert!(!step.is_active());
    }

    #[test]
    fn test_usage_total_invariant() {
        let usage = TokenUsage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_message_serde_roles() {
        let msg = Message::user("hi").with_id("m1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("tool".parse::<Role>().is_err());
    }
}
