//! Orchat Common - Shared utilities and types
//!
//! This crate provides the error type, configuration structs, the chat data
//! model and the token/cost estimator used across all Orchat components.

pub mod config;
pub mod constants;
pub mod error;
pub mod pricing;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::{
    AppConfig, ConversationConfig, MultiToolPolicy, ProviderConfig, SearchConfig,
    StorageBackend, StorageConfig,
};
pub use constants::*;
pub use error::{ChatError, Result};
pub use pricing::{ModelPricing, calculate_cost, estimate_tokens};
pub use types::{
    ChatThread, Message, ModelDescriptor, ReasoningStep, Role, SearchResult, StepKind,
    StepMetadata, StepStatus, ThreadUpdate, TokenUsage,
};
pub use utils::*;
