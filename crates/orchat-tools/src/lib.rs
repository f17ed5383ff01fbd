//! Orchat Tools - tools the model may call mid-stream
//!
//! This crate provides the `AiTool` contract, the static tool registry,
//! the `web_search` tool with its search collaborators, and the parser that
//! turns raw search output back into structured results for display.

pub mod base;
pub mod extract;
pub mod registry;
pub mod search;

// Re-export key tools for convenience
pub use base::{AiTool, ToolDefinition, ToolError, validate_against_schema};
pub use extract::extract_search_results;
pub use registry::ToolRegistry;
pub use search::{DuckDuckGoSearch, SearchBackend, TavilySearch, WebSearchTool, format_results};
