//! Common constants used across Orchat

/// Number of prior thread messages sent along with a new user message
pub const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Characters per estimated token
pub const CHARS_PER_TOKEN: usize = 4;

/// Maximum length of a thread title derived from the first user message
pub const THREAD_TITLE_MAX_CHARS: usize = 50;

/// Title used for threads without any user message
pub const DEFAULT_THREAD_TITLE: &str = "New Chat";

/// Assistant reply substituted when a tool round-trip fails
pub const TOOL_FAILURE_APOLOGY: &str = "I encountered an error while searching. Please try again.";

/// Placeholder label of a freshly detected tool call
pub const SEARCHING_LABEL: &str = "Searching...";

/// Label of a finished search step without a query argument
pub const SEARCH_COMPLETED_LABEL: &str = "Search completed";

/// Tokens per pricing unit (rates are quoted per million tokens)
pub const TOKENS_PER_PRICING_UNIT: f64 = 1_000_000.0;

/// Common tool identifiers
pub mod tools {
    pub const WEB_SEARCH: &str = "web_search";
}

/// OpenRouter endpoints and user-facing error texts
pub mod provider {
    pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
    pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
    pub const TOOLS_PARAMETER: &str = "tools";
}

/// Search collaborator defaults
pub mod search {
    pub const TAVILY_API_URL: &str = "https://api.tavily.com/search";
    pub const DUCKDUCKGO_API_URL: &str = "https://api.duckduckgo.com/";
    pub const DEFAULT_MAX_RESULTS: usize = 5;
    pub const DEFAULT_SEARCH_DEPTH: &str = "basic";
    pub const NO_RESULTS_TEXT: &str = "No search results found.";
}

/// User-visible turn failure reasons
pub mod errors {
    pub const FAILED_TO_SEND: &str = "Failed to send message";
    pub const FAILED_TO_SAVE_MESSAGE: &str = "Failed to save message";
    pub const FAILED_TO_SAVE_RESPONSE: &str = "Failed to save assistant response";
}

/// Default timeout values in seconds
pub mod timeouts {
    pub const DEFAULT_HTTP_TIMEOUT: u64 = 30;
    pub const DEFAULT_STREAM_OPEN_TIMEOUT: u64 = 60;
}
