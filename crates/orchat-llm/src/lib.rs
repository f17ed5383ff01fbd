//! Orchat LLM - streaming conversation engine
//!
//! This crate talks to the completion provider, reassembles streamed tool
//! calls and drives one user turn from the outgoing window to the persisted
//! assistant message.

pub mod accumulator;
pub mod conversation;
pub mod openrouter;
pub mod provider;

pub use accumulator::{PendingToolCall, ReadyToolCall, ToolCallAccumulator};
pub use conversation::{ChatEvent, ChatSession, TurnOutcome, TurnStatus};
pub use openrouter::{OpenRouterClient, parse_models};
pub use provider::{
    ChunkStream, CompletionProvider, CompletionRequest, ProviderMessage, ResolvedToolCall,
    StreamChunk, ToolCallFragment,
};
