//! Completion stream provider contract

use async_trait::async_trait;
use futures::Stream;
use orchat_common::{Message, Result, Role};
use orchat_tools::ToolDefinition;
use std::pin::Pin;

/// Lazy, finite sequence of chunks from one completion call
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A tool call as it is sent back to the provider in a follow-up window
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text
    pub arguments: String,
}

/// Role-tagged message in the provider's wire vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMessage {
    System(String),
    User(String),
    Assistant {
        content: String,
        tool_calls: Vec<ResolvedToolCall>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

impl ProviderMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        ProviderMessage::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Textual content counted by the token estimator
    pub fn text(&self) -> &str {
        match self {
            ProviderMessage::System(text) | ProviderMessage::User(text) => text,
            ProviderMessage::Assistant { content, .. } | ProviderMessage::Tool { content, .. } => {
                content
            }
        }
    }
}

impl From<&Message> for ProviderMessage {
    fn from(message: &Message) -> Self {
        match message.role {
            Role::System => ProviderMessage::System(message.content.clone()),
            Role::User => ProviderMessage::User(message.content.clone()),
            Role::Assistant => ProviderMessage::assistant(message.content.clone()),
        }
    }
}

/// Partial tool-call data reported by one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    /// Position of the call within the response
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Next piece of the JSON argument text
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// One incremental unit of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(fragment: ToolCallFragment) -> Self {
        Self {
            content: None,
            tool_calls: vec![fragment],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty) && self.tool_calls.is_empty()
    }
}

/// Parameters of one streaming completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    /// Tools bound to this call; empty means tool calling is off
    pub tools: Vec<ToolDefinition>,
}

/// Source of streamed completions
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a fresh completion stream. Streams are not restartable.
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream>;
}
